//! Presenter and world hooks for a headless engine.
//!
//! Nothing renders guild windows or runs scripts in this process, so
//! every presentation and hook call becomes a structured log line that a
//! map-server bridge (or an operator) can follow.

use guild_cache::{Presenter, WorldHooks};
use guild_types::{CastleId, CharId, Guild, GuildId, GuildView, InstanceId, Notification};
use tracing::{debug, info};

/// [`Presenter`] that logs every call.
#[derive(Debug, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn show(&mut self, to: CharId, view: GuildView, guild: &Guild) {
        debug!(char_id = %to, guild_id = %guild.id, view = ?view, "Guild view");
    }

    fn notify(&mut self, to: CharId, notification: Notification) {
        debug!(char_id = %to, notification = ?notification, "Guild notification");
    }

    fn broadcast(&mut self, text: &str) {
        info!(text, "Server announcement");
    }
}

/// [`WorldHooks`] that log every call.
#[derive(Debug, Default)]
pub struct LogHooks;

impl WorldHooks for LogHooks {
    fn run_event(&mut self, name: &str) {
        info!(event = name, "Script event");
    }

    fn session_attached(&mut self, char_id: CharId, guild_id: GuildId, instance: Option<InstanceId>) {
        debug!(char_id = %char_id, guild_id = %guild_id, instance = ?instance, "Session attached");
    }

    fn session_detached(&mut self, char_id: CharId, guild_id: GuildId) {
        debug!(char_id = %char_id, guild_id = %guild_id, "Session detached");
    }

    fn leave_personal_combat(&mut self, char_id: CharId) {
        debug!(char_id = %char_id, "Leaving personal combat");
    }

    fn castle_owner_changed(&mut self, castle_id: CastleId, owner: GuildId) {
        info!(castle_id = %castle_id, owner = %owner, "Guardians re-targeting");
    }

    fn castle_defense_changed(&mut self, castle_id: CastleId) {
        debug!(castle_id = %castle_id, "Guardians recomputing stats");
    }

    fn castle_emblem_changed(&mut self, castle_id: CastleId, emblem_id: u32) {
        debug!(castle_id = %castle_id, emblem_id, "Guardians redrawing emblem");
    }
}
