//! Guild disbanding.
//!
//! Disbanding is requested here but only happens when the authority
//! confirms it; [`GuildState::broken`] then tears the guild out of every
//! structure that refers to it.

use guild_types::{
    AccountId, AllianceFlags, AuthorityRequest, CastleField, CharId, GuildId, GuildView,
    Notification, Tick,
};
use tracing::{info, warn};

use crate::error::{GuildError, Rejection};
use crate::ports::Ports;
use crate::state::GuildState;

impl GuildState {
    /// Ask the authority to disband the requester's guild.
    ///
    /// Only the master may do this, only with the guild's exact name, and
    /// only once every other member has left.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for an unknown character.
    /// - [`GuildError::Rejected`] if a rule refuses the request.
    pub fn request_disband(
        &mut self,
        char_id: CharId,
        name: &str,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        let guild = self
            .guilds
            .get(session.guild_id)
            .ok_or(Rejection::NotInGuild)?;
        if guild.member_index(session.account_id, char_id) != Some(0) {
            return Err(Rejection::NotMaster.into());
        }
        if guild.name != name {
            return Err(Rejection::NameMismatch.into());
        }
        if guild.member_count() > 1 {
            return Err(Rejection::MembersRemain.into());
        }
        let guild_id = guild.id;
        ports.send(AuthorityRequest::Disband { guild_id });
        info!(guild_id = %guild_id, "Disband requested");
        Ok(())
    }

    /// The authority disbanded `guild_id`.
    ///
    /// Cooldown and grace timers are cancelled, every attached or
    /// claiming session is detached, every other guild's relation with it
    /// is removed, and every castle it owned becomes unowned.
    pub fn broken(&mut self, guild_id: GuildId, now: Tick, ports: &mut Ports<'_>) -> bool {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            warn!(guild_id = %guild_id, "Disband for uncached guild");
            return false;
        };
        for timer in guild.skill_timers.iter_mut().filter_map(Option::take) {
            self.timers.cancel(timer);
        }
        if let Some(timer) = guild.war_grace_timer.take() {
            self.timers.cancel(timer);
        }

        let disbanded = Notification::Disbanded { guild_id };
        for char_id in ports.sessions.characters() {
            let Some(session) = ports.sessions.by_char_mut(char_id) else {
                continue;
            };
            if session.guild_id != guild_id {
                continue;
            }
            session.clear_guild();
            ports.hooks.session_detached(char_id, guild_id);
            ports.presenter.notify(char_id, disbanded.clone());
        }

        for other in self.guilds.iter_mut().filter(|g| g.id != guild_id) {
            let Some(entry) = other.relations.remove(guild_id) else {
                continue;
            };
            other.recompute_war();
            let removed = Notification::RelationRemoved {
                guild_id,
                kind: entry.kind,
            };
            ports.notify_all(other, &removed);
            ports.show_all(other, GuildView::Relations);
            ports.send(AuthorityRequest::AllianceChange {
                guild_a: other.id,
                guild_b: guild_id,
                account_a: AccountId::NONE,
                account_b: AccountId::NONE,
                flags: AllianceFlags::removal(entry.kind),
            });
        }

        for castle_id in self.castles.owned_by(guild_id) {
            if let Some(castle) = self.castles.get(castle_id) {
                ports.hooks.run_event(&castle.event_name("OnGuildBreak"));
            }
            if let Err(e) = self.set_castle_field(castle_id, CastleField::Owner, 0, now, ports) {
                warn!(castle_id = %castle_id, error = %e, "Castle release failed");
            }
        }

        self.invites.retain(|_, invite| invite.guild_id != guild_id);
        self.proposals.retain(|_, proposal| proposal.guild_id != guild_id);
        self.guilds.remove(guild_id);
        info!(guild_id = %guild_id, "Guild disbanded");
        true
    }
}
