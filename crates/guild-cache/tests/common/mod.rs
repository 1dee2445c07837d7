//! Shared harness for guild cache integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::indexing_slicing)]

use guild_cache::config::CastleDefinition;
use guild_cache::{
    Clock, GuildConfig, GuildState, ManualClock, Ports, QueueLink, RecordingHooks,
    RecordingPresenter, Session, SessionDirectory, SessionTable,
};
use guild_types::{AccountId, CharId, Guild, GuildId, MemberSlot, Tick};

/// A guild cache with every collaborator recorded in memory.
pub struct World {
    pub state: GuildState,
    pub link: QueueLink,
    pub sessions: SessionTable,
    pub presenter: RecordingPresenter,
    pub hooks: RecordingHooks,
    pub clock: ManualClock,
}

impl World {
    pub fn new(config: GuildConfig) -> Self {
        Self {
            state: GuildState::new(config),
            link: QueueLink::new(),
            sessions: SessionTable::new(),
            presenter: RecordingPresenter::new(),
            hooks: RecordingHooks::new(),
            clock: ManualClock::at(Tick::from_secs(1_000)),
        }
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Run `f` against the state with borrowed collaborators and the
    /// current tick.
    pub fn run<R>(&mut self, f: impl FnOnce(&mut GuildState, &mut Ports<'_>, Tick) -> R) -> R {
        let now = self.clock.now();
        let mut ports = Ports {
            link: &mut self.link,
            sessions: &mut self.sessions,
            presenter: &mut self.presenter,
            hooks: &mut self.hooks,
        };
        f(&mut self.state, &mut ports, now)
    }

    /// Put a character in the world. Account and character share `id`.
    pub fn login(&mut self, id: u32, name: &str, guild: u32) {
        let mut session = Session::new(AccountId::new(id), CharId::new(id), name);
        session.guild_id = GuildId::new(guild);
        self.sessions.insert(session);
    }

    pub fn session(&self, id: u32) -> &Session {
        self.sessions.by_char(CharId::new(id)).unwrap()
    }

    pub fn session_mut(&mut self, id: u32) -> &mut Session {
        self.sessions.by_char_mut(CharId::new(id)).unwrap()
    }

    pub fn guild(&self, id: u32) -> &Guild {
        self.state.guild(GuildId::new(id)).unwrap()
    }

    /// Push a full record through reconciliation.
    pub fn push(&mut self, guild: Guild) {
        self.run(|s, p, now| s.receive_full(guild, now, p));
    }
}

/// A guild record whose first listed member is the master. Account and
/// character ids share the given number.
pub fn record(id: u32, name: &str, members: &[(u32, &str)]) -> Guild {
    let limits = GuildConfig::default().limits;
    let mut guild = Guild::new(
        GuildId::new(id),
        name,
        limits.member_slots,
        limits.position_slots,
        limits.relation_slots,
    );
    for (index, &(member, member_name)) in members.iter().enumerate() {
        let mut slot = MemberSlot::new(AccountId::new(member), CharId::new(member), member_name);
        slot.level = 50;
        slot.position = if index == 0 { 0 } else { 1 };
        guild.add_member(slot).unwrap();
    }
    if let Some(&(_, master)) = members.first() {
        guild.master = master.to_owned();
    }
    guild
}

/// Default configuration plus one castle per `(id, event)` on ruleset 1.
pub fn config_with_castles(castles: &[(u32, &str)]) -> GuildConfig {
    let mut config = GuildConfig::default();
    config.castles = castles
        .iter()
        .map(|&(id, event)| CastleDefinition {
            id,
            map: format!("castle_{id:02}"),
            name: format!("Castle {id}"),
            event: event.to_owned(),
            ruleset: 1,
        })
        .collect();
    config
}
