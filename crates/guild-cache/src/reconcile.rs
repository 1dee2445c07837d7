//! Merging authority pushes into the cache and binding sessions.
//!
//! The authority is always right: a full record replaces the cached one
//! wholesale. What this module adds on top of the overwrite is
//!
//! - carrying over local-only state (timers, grace lock, last seen
//!   member coordinates),
//! - binding live sessions to member slots and repairing sessions that
//!   contradict the record,
//! - recomputing war flags from reciprocal enemy entries,
//! - diffing against the previous copy so only changed views are shown.

use std::collections::BTreeSet;

use guild_types::{AuthorityRequest, CharId, Guild, GuildId, GuildView, RelationKind, Tick};
use tracing::{debug, info, warn};

use crate::error::GuildError;
use crate::ports::Ports;
use crate::state::GuildState;

/// What a full-record push changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The guild was not cached before.
    pub created: bool,
    /// Views shown to every bound member.
    pub views: BTreeSet<GuildView>,
}

impl GuildState {
    /// Merge a full guild record pushed by the authority.
    pub fn receive_full(&mut self, mut guild: Guild, now: Tick, ports: &mut Ports<'_>) -> ReconcileOutcome {
        let guild_id = guild.id;
        self.normalize(&mut guild);

        let before = self.guilds.remove(guild_id);
        let created = before.is_none();
        if let Some(previous) = &before {
            guild.skill_timers.clone_from(&previous.skill_timers);
            guild.war_grace_until = previous.war_grace_until;
            guild.war_grace_timer = previous.war_grace_timer;
            for member in &mut guild.members {
                if let Some(old) = previous.member(member.account_id, member.char_id) {
                    member.last_position.clone_from(&old.last_position);
                }
            }
        }

        if created {
            let master = guild.master.clone();
            if let Some(char_id) = ports
                .sessions
                .by_name(&master)
                .filter(|s| s.guild_id == guild_id)
                .map(|s| s.char_id)
            {
                if let Some(session) = ports.sessions.by_char_mut(char_id) {
                    session.is_master = true;
                }
            }
        }

        bind_slots(&mut guild, before.as_ref(), ports);

        let mut views = BTreeSet::new();
        let reference = before.as_ref().unwrap_or(&guild);
        if reference.level != guild.level
            || reference.max_member != guild.max_member
            || reference.member_count() != guild.member_count()
        {
            views.insert(GuildView::BasicInfo);
            views.insert(GuildView::Emblem);
        }
        if reference.member_count() != guild.member_count() {
            views.insert(GuildView::Roster);
        }
        if reference.skill_point != guild.skill_point {
            views.insert(GuildView::SkillInfo);
        }
        if created {
            views.insert(GuildView::Belonging);
            views.insert(GuildView::Notice);
            for char_id in guild.bound_chars() {
                if let Some(session) = ports.sessions.by_char_mut(char_id) {
                    session.emblem_id = guild.emblem_id;
                }
            }
        }

        let previous_war: Vec<GuildId> = before
            .as_ref()
            .map(|g| g.relations.iter().filter(|e| e.war).map(|e| e.guild_id).collect())
            .unwrap_or_default();
        self.guilds.insert(guild);
        self.reconcile_war(guild_id, &previous_war, now, ports);

        if let Some(guild) = self.guilds.get(guild_id) {
            for &view in &views {
                ports.show_all(guild, view);
            }
        }

        if created {
            info!(guild_id = %guild_id, "Guild cached");
            self.audit_membership(guild_id, ports);
        } else {
            debug!(guild_id = %guild_id, views = views.len(), "Guild record reconciled");
        }
        self.resolve_info_events(guild_id, ports);

        ReconcileOutcome { created, views }
    }

    fn normalize(&self, guild: &mut Guild) {
        let limits = &self.config.limits;
        if guild.members.len() < limits.member_slots {
            guild.members.resize_with(limits.member_slots, Default::default);
        }
        if guild.positions.len() < limits.position_slots {
            guild.positions.resize_with(limits.position_slots, Default::default);
        }
        if guild.max_member == 0 || guild.max_member > guild.members.len() {
            guild.max_member = guild.members.len();
        }
        guild.relations.resize(limits.relation_slots);
        let cooldown_slots = if self.config.skills.separate_cooldowns {
            limits.skill_slots.max(1)
        } else {
            1
        };
        guild.skill_timers.resize(cooldown_slots, None);
        for member in &mut guild.members {
            member.bound = false;
        }
    }

    /// Recompute war flags for `guild_id` and every cached peer.
    ///
    /// A reciprocal enemy pair that was not at war before starts one
    /// quietly; a pair that lost reciprocity stops.
    fn reconcile_war(&mut self, guild_id: GuildId, previous_war: &[GuildId], now: Tick, ports: &mut Ports<'_>) {
        let Some(guild) = self.guilds.get(guild_id) else {
            return;
        };
        let enemies: Vec<(GuildId, String)> = guild
            .relations
            .iter()
            .filter(|e| e.kind == RelationKind::Enemy)
            .map(|e| (e.guild_id, e.name.clone()))
            .collect();
        let own_name = guild.name.clone();

        let mut starting: Vec<(GuildId, String)> = Vec::new();
        for (peer_id, peer_name) in enemies {
            let reciprocal = self
                .guilds
                .get(peer_id)
                .is_some_and(|p| p.relations.holds(guild_id, RelationKind::Enemy));
            if let Some(entry) = self
                .guilds
                .get_mut(guild_id)
                .and_then(|g| g.relations.get_mut(peer_id))
            {
                entry.war = reciprocal;
            }
            if let Some(peer) = self.guilds.get_mut(peer_id) {
                if let Some(entry) = peer.relations.get_mut(guild_id) {
                    if entry.kind == RelationKind::Enemy {
                        entry.war = reciprocal;
                    }
                }
                peer.recompute_war();
            }
            if reciprocal && !previous_war.contains(&peer_id) {
                starting.push((peer_id, peer_name));
            }
        }
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            guild.recompute_war();
        }

        for (peer_id, peer_name) in starting {
            self.war_init(guild_id, &peer_name, false, now, ports);
            self.war_init(peer_id, &own_name, false, now, ports);
        }
    }

    /// The authority has no record of `guild_id`. Every session claiming
    /// it is detached, and callbacks waiting for it are discarded.
    pub fn receive_no_info(&mut self, guild_id: GuildId, ports: &mut Ports<'_>) -> usize {
        let mut detached: usize = 0;
        for char_id in ports.sessions.characters() {
            let Some(session) = ports.sessions.by_char_mut(char_id) else {
                continue;
            };
            if session.guild_id != guild_id {
                continue;
            }
            session.clear_guild();
            ports.hooks.session_detached(char_id, guild_id);
            detached = detached.saturating_add(1);
        }
        for event in self.info_events.resolve(guild_id) {
            warn!(guild_id = %guild_id, event = %event, "Discarding info event for unknown guild");
        }
        if let Some(guild) = self.guilds.remove(guild_id) {
            warn!(guild_id = %guild_id, name = %guild.name, "Authority disowned a cached guild");
        }
        info!(guild_id = %guild_id, detached, "Guild unknown to authority");
        detached
    }

    /// Detach every live session that claims `guild_id` but is not on its
    /// roster. Returns how many were repaired.
    pub fn audit_membership(&mut self, guild_id: GuildId, ports: &mut Ports<'_>) -> usize {
        let Some(guild) = self.guilds.get(guild_id) else {
            return 0;
        };
        let mut repaired: usize = 0;
        for char_id in ports.sessions.characters() {
            let Some(session) = ports.sessions.by_char_mut(char_id) else {
                continue;
            };
            if session.guild_id != guild_id || guild.member(session.account_id, char_id).is_some() {
                continue;
            }
            warn!(guild_id = %guild_id, char_id = %char_id, "Session not on roster, detaching");
            session.clear_guild();
            ports.hooks.session_detached(char_id, guild_id);
            repaired = repaired.saturating_add(1);
        }
        repaired
    }

    /// Bind a session that just entered the world to its guild slot.
    ///
    /// Returns whether the session was bound. An uncached guild is
    /// fetched and the bind happens when the record arrives.
    ///
    /// # Errors
    ///
    /// Returns [`GuildError::SessionNotFound`] for an unknown character.
    pub fn member_joined(&mut self, char_id: CharId, ports: &mut Ports<'_>) -> Result<bool, GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        let guild_id = session.guild_id;
        let account_id = session.account_id;
        if guild_id.is_none() {
            return Ok(false);
        }
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            self.request_info(guild_id, ports);
            return Ok(false);
        };
        let Some(index) = guild.member_index(account_id, char_id) else {
            warn!(guild_id = %guild_id, char_id = %char_id, "Joined session not on roster");
            if let Some(session) = ports.sessions.by_char_mut(char_id) {
                session.clear_guild();
            }
            return Ok(false);
        };
        if let Some(slot) = guild.members.get_mut(index) {
            slot.bound = true;
        }
        if let Some(session) = ports.sessions.by_char_mut(char_id) {
            session.is_master = index == 0;
            session.emblem_id = guild.emblem_id;
        }
        ports.hooks.session_attached(char_id, guild_id, guild.instance_id);
        debug!(guild_id = %guild_id, char_id = %char_id, slot = index, "Session bound");
        Ok(true)
    }

    /// Clear a session's guild affiliation and unbind its slot.
    pub(crate) fn detach_session(&mut self, guild_id: GuildId, char_id: CharId, ports: &mut Ports<'_>) {
        if let Some(slot) = self
            .guilds
            .get_mut(guild_id)
            .and_then(|g| g.members.iter_mut().find(|m| !m.is_empty() && m.char_id == char_id))
        {
            slot.bound = false;
        }
        if let Some(session) = ports.sessions.by_char_mut(char_id) {
            if session.guild_id == guild_id {
                session.clear_guild();
                ports.hooks.session_detached(char_id, guild_id);
            }
        }
    }
}

/// Bind every filled slot whose character has a live session in this
/// guild. A session in another guild is reported back as a mismatch.
fn bind_slots(guild: &mut Guild, before: Option<&Guild>, ports: &mut Ports<'_>) {
    let guild_id = guild.id;
    let instance = guild.instance_id;
    let usable = guild.max_member.min(guild.members.len());
    for member in guild.members.iter_mut().take(usable) {
        if member.is_empty() {
            continue;
        }
        let Some(session) = ports.sessions.by_char(member.char_id) else {
            continue;
        };
        if session.account_id != member.account_id {
            continue;
        }
        if session.guild_id != guild_id {
            warn!(
                guild_id = %guild_id,
                char_id = %member.char_id,
                session_guild = %session.guild_id,
                "Session disagrees with guild roster"
            );
            ports.send(AuthorityRequest::RemoveMember {
                guild_id,
                account_id: member.account_id,
                char_id: member.char_id,
                expelled: false,
                message: "** Guild Mismatch **".to_owned(),
            });
            continue;
        }
        member.bound = true;
        let was_bound = before
            .and_then(|b| b.member(member.account_id, member.char_id))
            .is_some_and(|m| m.bound);
        if !was_bound {
            ports.hooks.session_attached(member.char_id, guild_id, instance);
        }
    }
}
