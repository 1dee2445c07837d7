//! The guild cache aggregate.
//!
//! [`GuildState`] owns every registry and queue. It is driven from a
//! single thread: gameplay calls, authority pushes, and timer polls all
//! arrive as method calls carrying the current [`Tick`] and a borrowed
//! [`Ports`] bundle. Operations are split across modules by concern,
//! each adding an `impl GuildState` block.

use std::collections::HashMap;

use guild_types::{AccountId, AuthorityRequest, CharId, Guild, GuildId, Notification, Tick};
use tracing::{debug, info, warn};

use crate::castle::CastleRegistry;
use crate::config::GuildConfig;
use crate::exp_cache::ExpCache;
use crate::info_event::InfoEventQueue;
use crate::ports::Ports;
use crate::registry::GuildRegistry;
use crate::timers::{TimerKind, TimerQueue};

/// An invitation waiting for the invited character's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInvite {
    /// Inviting guild.
    pub guild_id: GuildId,
    /// Inviter account.
    pub inviter_account: AccountId,
    /// Inviter character.
    pub inviter_char: CharId,
}

/// An alliance proposal waiting for the target's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllianceProposal {
    /// Proposing guild.
    pub guild_id: GuildId,
    /// Proposing account.
    pub account_id: AccountId,
}

/// Every cache this process keeps about guilds and castles.
#[derive(Debug)]
pub struct GuildState {
    pub(crate) config: GuildConfig,
    pub(crate) guilds: GuildRegistry,
    pub(crate) castles: CastleRegistry,
    pub(crate) exp: ExpCache,
    pub(crate) info_events: InfoEventQueue,
    pub(crate) timers: TimerQueue,
    pub(crate) invites: HashMap<CharId, PendingInvite>,
    pub(crate) proposals: HashMap<AccountId, AllianceProposal>,
}

impl GuildState {
    /// Empty caches sized and ruled by `config`, with every configured
    /// castle unowned.
    pub fn new(config: GuildConfig) -> Self {
        let castles =
            CastleRegistry::from_definitions(&config.castles, config.limits.guardian_slots);
        let exp = ExpCache::new(config.limits.exp_pool_capacity);
        info!(
            castles = config.castles.len(),
            member_slots = config.limits.member_slots,
            relation_slots = config.limits.relation_slots,
            "Guild cache initialized"
        );
        Self {
            config,
            guilds: GuildRegistry::new(),
            castles,
            exp,
            info_events: InfoEventQueue::new(),
            timers: TimerQueue::new(),
            invites: HashMap::new(),
            proposals: HashMap::new(),
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &GuildConfig {
        &self.config
    }

    /// The guild registry.
    pub const fn guilds(&self) -> &GuildRegistry {
        &self.guilds
    }

    /// A cached guild.
    pub fn guild(&self, guild_id: GuildId) -> Option<&Guild> {
        self.guilds.get(guild_id)
    }

    /// A cached guild, by case-insensitive name.
    pub fn guild_by_name(&self, name: &str) -> Option<&Guild> {
        self.guilds.by_name(name)
    }

    /// The castle registry.
    pub const fn castles(&self) -> &CastleRegistry {
        &self.castles
    }

    /// The exp write-back cache.
    pub const fn exp_cache(&self) -> &ExpCache {
        &self.exp
    }

    /// Callbacks waiting for guild records.
    pub const fn info_events(&self) -> &InfoEventQueue {
        &self.info_events
    }

    /// Pending one-shot timers.
    pub const fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// The invitation pending for a character.
    pub fn pending_invite(&self, char_id: CharId) -> Option<&PendingInvite> {
        self.invites.get(&char_id)
    }

    /// The alliance proposal pending for an account.
    pub fn pending_proposal(&self, account_id: AccountId) -> Option<&AllianceProposal> {
        self.proposals.get(&account_id)
    }

    /// Fetch a guild record unless it is cached.
    ///
    /// Returns whether a request was sent.
    pub fn request_info(&mut self, guild_id: GuildId, ports: &mut Ports<'_>) -> bool {
        if guild_id.is_none() || self.guilds.contains(guild_id) {
            return false;
        }
        ports.send(AuthorityRequest::RequestInfo { guild_id })
    }

    /// Run `event` once the guild record is available.
    ///
    /// A cached guild runs it at once. Otherwise it is parked; only the
    /// first parked event for an id triggers the fetch.
    pub fn request_info_with(&mut self, guild_id: GuildId, event: &str, ports: &mut Ports<'_>) {
        if guild_id.is_none() {
            return;
        }
        if self.guilds.contains(guild_id) {
            ports.hooks.run_event(event);
            return;
        }
        if self.info_events.register(guild_id, event) {
            ports.send(AuthorityRequest::RequestInfo { guild_id });
        } else {
            debug!(guild_id = %guild_id, event, "Queued behind pending guild fetch");
        }
    }

    /// Run every parked event for a guild that just arrived, newest first.
    pub(crate) fn resolve_info_events(&mut self, guild_id: GuildId, ports: &mut Ports<'_>) {
        for event in self.info_events.resolve(guild_id) {
            ports.hooks.run_event(&event);
        }
    }

    /// Fire every timer due at `now`. Returns how many fired.
    pub fn run_timers(&mut self, now: Tick, ports: &mut Ports<'_>) -> usize {
        let due = self.timers.pop_due(now);
        let fired = due.len();
        for (id, kind) in due {
            match kind {
                TimerKind::SkillCooldown {
                    guild_id,
                    slot,
                    skill_id,
                } => {
                    let Some(guild) = self.guilds.get_mut(guild_id) else {
                        continue;
                    };
                    match guild.skill_timers.get_mut(slot) {
                        Some(stored) if *stored == Some(id) => *stored = None,
                        _ => continue,
                    }
                    let ready = Notification::text(format!(
                        "[{}] Guild skill {skill_id} is ready.",
                        guild.name
                    ));
                    ports.notify_all(guild, &ready);
                    debug!(guild_id = %guild_id, skill_id, "Guild skill cooldown ended");
                }
                TimerKind::WarGrace { guild_id } => {
                    let Some(guild) = self.guilds.get_mut(guild_id) else {
                        continue;
                    };
                    if guild.war_grace_timer == Some(id) {
                        guild.war_grace_timer = None;
                        guild.war_grace_until = None;
                        debug!(guild_id = %guild_id, "War grace lock lifted");
                    }
                }
            }
        }
        fired
    }

    /// Final flush before the process exits.
    ///
    /// Parked info events are dropped (and logged), the exp cache is
    /// flushed, and pending invitations and proposals are forgotten.
    pub fn shutdown(&mut self, ports: &mut Ports<'_>) {
        for (guild_id, event) in self.info_events.drain_all() {
            warn!(guild_id = %guild_id, event, "Dropping info event on shutdown");
        }
        let report = self.flush_exp(ports);
        self.invites.clear();
        self.proposals.clear();
        info!(
            exp_written = report.written,
            exp_dropped = report.dropped,
            castle_writes_pending = self.castles.pending().len(),
            "Guild cache shut down"
        );
    }
}
