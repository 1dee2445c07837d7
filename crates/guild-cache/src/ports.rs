//! Collaborator seams.
//!
//! The cache never owns sessions, never encodes client packets, and
//! never talks to the network itself. Each of those concerns is a trait
//! here; an operation receives them bundled in [`Ports`].
//!
//! - [`AuthorityLink`] -- hands requests to the authority process
//! - [`SessionDirectory`] -- non-owning lookup of live player sessions
//! - [`Presenter`] -- shows guild state and notifications to sessions
//! - [`WorldHooks`] -- named events, guardians, session side effects

use guild_types::{
    AccountId, AuthorityRequest, CastleId, CharId, Guild, GuildId, GuildView, InstanceId,
    MapPosition, Notification,
};

use crate::error::LinkError;

/// Live player session state the cache reads and repairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Account.
    pub account_id: AccountId,
    /// Character.
    pub char_id: CharId,
    /// Character name.
    pub name: String,
    /// Base level.
    pub level: u16,
    /// Job class.
    pub class: u16,
    /// Guild affiliation, 0 for none.
    pub guild_id: GuildId,
    /// Emblem version shown for this character.
    pub emblem_id: u32,
    /// The session belongs to its guild's master.
    pub is_master: bool,
    /// Current map coordinates.
    pub position: MapPosition,
    /// The current map is a siege castle.
    pub on_castle_map: bool,
    /// The current map forbids guild war.
    pub guild_war_forbidden: bool,
    /// Personal PvP mode or duel is active.
    pub personal_combat: bool,
    /// Visible counter of castle holds credited to this character.
    pub capture_count: u32,
}

impl Session {
    /// A guildless session.
    pub fn new(account_id: AccountId, char_id: CharId, name: impl Into<String>) -> Self {
        Self {
            account_id,
            char_id,
            name: name.into(),
            level: 1,
            ..Self::default()
        }
    }

    /// Drop guild affiliation.
    pub const fn clear_guild(&mut self) {
        self.guild_id = GuildId::NONE;
        self.emblem_id = 0;
        self.is_master = false;
    }
}

/// Outbound channel to the authority process.
pub trait AuthorityLink {
    /// Hand a request to the channel. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Disconnected`] when the channel is down.
    fn send(&mut self, request: AuthorityRequest) -> Result<(), LinkError>;
}

/// Non-owning lookup of live sessions.
pub trait SessionDirectory {
    /// Session for a character.
    fn by_char(&self, char_id: CharId) -> Option<&Session>;

    /// Mutable session for a character.
    fn by_char_mut(&mut self, char_id: CharId) -> Option<&mut Session>;

    /// Session logged in on an account.
    fn by_account(&self, account_id: AccountId) -> Option<&Session>;

    /// Session by character name.
    fn by_name(&self, name: &str) -> Option<&Session>;

    /// Every live character.
    fn characters(&self) -> Vec<CharId>;
}

/// Presentation of guild state to sessions.
pub trait Presenter {
    /// Show a view of `guild` to one session.
    fn show(&mut self, to: CharId, view: GuildView, guild: &Guild);

    /// Show a one-off notification to one session.
    fn notify(&mut self, to: CharId, notification: Notification);

    /// Announce to every session on the server.
    fn broadcast(&mut self, text: &str);
}

/// Effects outside the cache's ownership.
pub trait WorldHooks {
    /// Run a named script event, e.g. `Agit_A01::OnGuildBreak`.
    fn run_event(&mut self, name: &str);

    /// A session was attached to its guild. Rebinds instance access and
    /// channel membership.
    fn session_attached(&mut self, char_id: CharId, guild_id: GuildId, instance: Option<InstanceId>);

    /// A session lost its guild. Tears down guild-granted effects and
    /// channel membership.
    fn session_detached(&mut self, char_id: CharId, guild_id: GuildId);

    /// Force a session out of personal PvP and duels.
    fn leave_personal_combat(&mut self, char_id: CharId);

    /// A castle's owner changed; guardians must re-target.
    fn castle_owner_changed(&mut self, castle_id: CastleId, owner: GuildId);

    /// A castle's defense changed; guardians must recompute stats.
    fn castle_defense_changed(&mut self, castle_id: CastleId);

    /// The owning guild's emblem changed; guardians must redraw.
    fn castle_emblem_changed(&mut self, castle_id: CastleId, emblem_id: u32);
}

/// Every collaborator an operation may touch, borrowed for one call.
pub struct Ports<'a> {
    /// Authority channel.
    pub link: &'a mut dyn AuthorityLink,
    /// Session lookup.
    pub sessions: &'a mut dyn SessionDirectory,
    /// Presentation layer.
    pub presenter: &'a mut dyn Presenter,
    /// World side effects.
    pub hooks: &'a mut dyn WorldHooks,
}

impl Ports<'_> {
    /// Send a request, logging (not propagating) a channel failure.
    ///
    /// Returns whether the request was handed over.
    pub fn send(&mut self, request: AuthorityRequest) -> bool {
        match self.link.send(request) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "authority request dropped");
                false
            }
        }
    }

    /// Show a view to every session attached to `guild`.
    pub fn show_all(&mut self, guild: &Guild, view: GuildView) {
        for member in guild.bound_members() {
            self.presenter.show(member.char_id, view, guild);
        }
    }

    /// Notify every session attached to `guild`.
    pub fn notify_all(&mut self, guild: &Guild, notification: &Notification) {
        for member in guild.bound_members() {
            self.presenter.notify(member.char_id, notification.clone());
        }
    }
}
