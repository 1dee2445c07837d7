//! Alliance and opposition state machine.
//!
//! A relation entry is either absent, `Ally`, or `Enemy`. An enemy entry
//! is unilateral until the peer holds an enemy entry pointing back, at
//! which point both flip to `war = true` together and a grace lock keeps
//! either side from breaking the war for `war.grace_secs`.
//!
//! Local tables are committed optimistically when a request is sent; the
//! authority's [`AllianceAck`] re-applies the change idempotently, or
//! rolls it back when the authority refused it.

use guild_types::{
    AccountId, AllianceFlags, AuthorityRequest, CharId, Guild, GuildId, GuildView, Notification,
    RelationEntry, RelationKind, Tick,
};
use tracing::{debug, info, warn};

use crate::error::{GuildError, Rejection};
use crate::ports::Ports;
use crate::state::{AllianceProposal, GuildState};
use crate::timers::TimerKind;

/// A relation change committed (or refused) by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllianceAck {
    /// Initiating guild.
    pub guild_a: GuildId,
    /// Peer guild.
    pub guild_b: GuildId,
    /// Initiating account.
    pub account_a: AccountId,
    /// Peer account.
    pub account_b: AccountId,
    /// What changed.
    pub flags: AllianceFlags,
    /// Initiating guild's name.
    pub name_a: String,
    /// Peer guild's name.
    pub name_b: String,
}

/// Guild master, or a position carrying the invite bit.
fn has_standing(guild: &Guild, account_id: AccountId, char_id: CharId) -> bool {
    guild.member_index(account_id, char_id) == Some(0)
        || guild
            .position_of(account_id, char_id)
            .is_some_and(guild_types::Position::can_invite)
}

impl GuildState {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether `a` holds a reciprocated war entry against `b`.
    ///
    /// Hostile contact keeps the war locked: a `true` answer re-arms the
    /// grace lock on both guilds.
    pub fn is_enemy(&mut self, a: GuildId, b: GuildId, now: Tick) -> bool {
        let at_war = self
            .guilds
            .get(a)
            .and_then(|g| g.relations.get(b))
            .is_some_and(RelationEntry::is_war);
        if at_war {
            self.arm_grace(a, now);
            self.arm_grace(b, now);
        }
        at_war
    }

    /// Whether `a` and `b` are allied.
    pub fn is_allied(&self, a: GuildId, b: GuildId) -> bool {
        self.guilds
            .get(a)
            .is_some_and(|g| g.relations.holds(b, RelationKind::Ally))
    }

    /// Whether `a` may drop its relation with `b` now.
    ///
    /// A war entry is locked until `a`'s grace period has elapsed.
    pub fn can_break(&self, a: GuildId, b: GuildId, now: Tick) -> bool {
        let Some(guild) = self.guilds.get(a) else {
            return true;
        };
        let at_war = guild.relations.get(b).is_some_and(RelationEntry::is_war);
        !at_war || guild.war_grace_until.is_none_or(|until| until <= now)
    }

    /// Number of relations of `kind` a guild holds.
    pub fn alliance_count(&self, guild_id: GuildId, kind: RelationKind) -> usize {
        self.guilds
            .get(guild_id)
            .map_or(0, |g| g.relations.count(kind))
    }

    // -----------------------------------------------------------------------
    // Alliance
    // -----------------------------------------------------------------------

    /// Propose an alliance to the guild of `target_char`.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for either character.
    /// - [`GuildError::GuildNotFound`] if either guild is not cached.
    /// - [`GuildError::Rejected`] if a rule refuses the proposal.
    pub fn propose_alliance(
        &mut self,
        char_id: CharId,
        target_char: CharId,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        let (account_id, guild_id) = (session.account_id, session.guild_id);
        if guild_id.is_none() {
            return Err(Rejection::NotInGuild.into());
        }
        if self.config.war.block_alliance_during_siege && self.castles.any_siege_active() {
            return Err(Rejection::SiegeActive.into());
        }
        let target = ports
            .sessions
            .by_char(target_char)
            .ok_or(GuildError::SessionNotFound(target_char))?;
        let (target_account, target_guild) = (target.account_id, target.guild_id);
        if target_guild.is_none() {
            return Err(Rejection::TargetNotInGuild.into());
        }
        if target_guild == guild_id {
            return Err(Rejection::SameGuild.into());
        }

        let guild = self
            .guilds
            .get(guild_id)
            .ok_or(GuildError::GuildNotFound(guild_id))?;
        let peer = self
            .guilds
            .get(target_guild)
            .ok_or(GuildError::GuildNotFound(target_guild))?;
        if !has_standing(guild, account_id, char_id) {
            return Err(Rejection::MissingPermission.into());
        }
        let cap = self.config.limits.max_allies;
        if guild.relations.count(RelationKind::Ally) >= cap {
            return Err(Rejection::AllyLimitReached.into());
        }
        if peer.relations.count(RelationKind::Ally) >= cap {
            return Err(Rejection::TargetAllyLimitReached.into());
        }
        if self.proposals.contains_key(&target_account) {
            return Err(Rejection::TargetBusy.into());
        }
        if guild.relations.holds(target_guild, RelationKind::Ally) {
            return Err(Rejection::AlreadyAllied.into());
        }

        let name = guild.name.clone();
        self.proposals.insert(
            target_account,
            AllianceProposal {
                guild_id,
                account_id,
            },
        );
        ports.presenter.notify(
            target_char,
            Notification::AllianceProposed {
                guild_id,
                account_id,
                name,
            },
        );
        debug!(guild_id = %guild_id, target = %target_guild, "Alliance proposed");
        Ok(())
    }

    /// Answer the alliance proposal sent to `target_char` by `from_account`.
    ///
    /// Caps and table room are checked again. Unilateral oppositions
    /// between the two guilds are dropped before the alliance is written.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for an unknown character.
    /// - [`GuildError::GuildNotFound`] if either guild is not cached.
    /// - [`GuildError::Rejected`] if no proposal is pending or a rule
    ///   refuses it now.
    pub fn reply_alliance(
        &mut self,
        target_char: CharId,
        from_account: AccountId,
        accept: bool,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let target = ports
            .sessions
            .by_char(target_char)
            .ok_or(GuildError::SessionNotFound(target_char))?;
        let (target_account, guild_b) = (target.account_id, target.guild_id);
        let proposal = match self.proposals.get(&target_account) {
            Some(p) if p.account_id == from_account => *p,
            _ => return Err(Rejection::NotInvited.into()),
        };
        self.proposals.remove(&target_account);
        let guild_a = proposal.guild_id;

        if !accept {
            if let Some(proposer) = ports.sessions.by_account(from_account).map(|s| s.char_id) {
                ports.presenter.notify(proposer, Notification::AllianceDeclined);
            }
            return Ok(());
        }

        let a = self
            .guilds
            .get(guild_a)
            .ok_or(GuildError::GuildNotFound(guild_a))?;
        let b = self
            .guilds
            .get(guild_b)
            .ok_or(GuildError::GuildNotFound(guild_b))?;
        let cap = self.config.limits.max_allies;
        if a.relations.holds(guild_b, RelationKind::Ally) {
            return Err(Rejection::AlreadyAllied.into());
        }
        if a.relations.count(RelationKind::Ally) >= cap {
            return Err(Rejection::AllyLimitReached.into());
        }
        if b.relations.count(RelationKind::Ally) >= cap {
            return Err(Rejection::TargetAllyLimitReached.into());
        }
        let war_between = a.relations.get(guild_b).is_some_and(RelationEntry::is_war);
        if war_between {
            return Err(Rejection::AlreadyOpposed.into());
        }
        let room = |g: &Guild, peer: GuildId| {
            let freed = usize::from(g.relations.holds(peer, RelationKind::Enemy));
            g.relations.len().saturating_sub(freed) < g.relations.capacity()
        };
        if !room(a, guild_b) || !room(b, guild_a) {
            return Err(Rejection::RelationTableFull.into());
        }
        let (name_a, name_b) = (a.name.clone(), b.name.clone());

        for (side, peer) in [(guild_a, guild_b), (guild_b, guild_a)] {
            let Some(guild) = self.guilds.get_mut(side) else {
                continue;
            };
            if guild.relations.remove_kind(peer, RelationKind::Enemy).is_some() {
                let removed = Notification::RelationRemoved {
                    guild_id: peer,
                    kind: RelationKind::Enemy,
                };
                ports.notify_all(guild, &removed);
                ports.send(AuthorityRequest::AllianceChange {
                    guild_a: side,
                    guild_b: peer,
                    account_a: AccountId::NONE,
                    account_b: AccountId::NONE,
                    flags: AllianceFlags::removal(RelationKind::Enemy),
                });
            }
        }

        self.insert_relation(guild_a, RelationEntry::new(guild_b, name_b, RelationKind::Ally));
        self.insert_relation(guild_b, RelationEntry::new(guild_a, name_a, RelationKind::Ally));
        ports.send(AuthorityRequest::AllianceChange {
            guild_a,
            guild_b,
            account_a: from_account,
            account_b: target_account,
            flags: AllianceFlags::new(RelationKind::Ally),
        });
        self.show_relations(guild_a, ports);
        self.show_relations(guild_b, ports);
        info!(guild_a = %guild_a, guild_b = %guild_b, "Alliance formed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Opposition
    // -----------------------------------------------------------------------

    /// Declare opposition against the guild of `target_char`.
    ///
    /// If the target guild already opposes this one, the declaration
    /// reciprocates it and war begins.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for either character.
    /// - [`GuildError::GuildNotFound`] if the declaring guild is not cached.
    /// - [`GuildError::Rejected`] if a rule refuses the declaration.
    pub fn declare_opposition(
        &mut self,
        char_id: CharId,
        target_char: CharId,
        now: Tick,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        let (account_id, guild_id) = (session.account_id, session.guild_id);
        if guild_id.is_none() {
            return Err(Rejection::NotInGuild.into());
        }
        let target = ports
            .sessions
            .by_char(target_char)
            .ok_or(GuildError::SessionNotFound(target_char))?;
        let (target_account, peer_id) = (target.account_id, target.guild_id);
        if peer_id.is_none() {
            return Err(Rejection::TargetNotInGuild.into());
        }
        if peer_id == guild_id {
            return Err(Rejection::SameGuild.into());
        }

        let guild = self
            .guilds
            .get(guild_id)
            .ok_or(GuildError::GuildNotFound(guild_id))?;
        if !has_standing(guild, account_id, char_id) {
            return Err(Rejection::MissingPermission.into());
        }
        if guild.relations.holds(peer_id, RelationKind::Ally) {
            return Err(Rejection::AlliedWithTarget.into());
        }
        if guild.relations.holds(peer_id, RelationKind::Enemy) {
            return Err(Rejection::AlreadyOpposed.into());
        }
        if guild.relations.count(RelationKind::Enemy) >= self.config.limits.max_enemies {
            return Err(Rejection::EnemyLimitReached.into());
        }
        if guild.relations.len() >= guild.relations.capacity() {
            return Err(Rejection::RelationTableFull.into());
        }

        let peer_name = self
            .guilds
            .get(peer_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        if peer_name.is_empty() {
            self.request_info(peer_id, ports);
        }
        self.insert_relation(guild_id, RelationEntry::new(peer_id, peer_name, RelationKind::Enemy));
        ports.send(AuthorityRequest::AllianceChange {
            guild_a: guild_id,
            guild_b: peer_id,
            account_a: account_id,
            account_b: target_account,
            flags: AllianceFlags::new(RelationKind::Enemy),
        });
        self.show_relations(guild_id, ports);
        debug!(guild_id = %guild_id, peer = %peer_id, "Opposition declared");

        self.start_war_if_reciprocal(guild_id, peer_id, now, ports);
        Ok(())
    }

    /// Drop this guild's relation of `kind` with `peer`.
    ///
    /// # Errors
    ///
    /// - [`GuildError::SessionNotFound`] for an unknown character.
    /// - [`GuildError::RelationNotFound`] if no such relation exists.
    /// - [`GuildError::Rejected`] if the war lock still holds, a siege is
    ///   running, or the requester lacks standing.
    pub fn delete_relation(
        &mut self,
        char_id: CharId,
        peer_id: GuildId,
        kind: RelationKind,
        now: Tick,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        let (account_id, guild_id) = (session.account_id, session.guild_id);
        let guild = self
            .guilds
            .get(guild_id)
            .ok_or(Rejection::NotInGuild)?;
        if !has_standing(guild, account_id, char_id) {
            return Err(Rejection::MissingPermission.into());
        }
        if self.config.war.block_alliance_during_siege && self.castles.any_siege_active() {
            return Err(Rejection::SiegeActive.into());
        }
        if !guild.relations.holds(peer_id, kind) {
            return Err(GuildError::RelationNotFound {
                guild_id,
                peer: peer_id,
            });
        }
        if !self.can_break(guild_id, peer_id, now) {
            return Err(Rejection::WarLocked.into());
        }

        self.apply_removal(guild_id, peer_id, kind, ports);
        ports.send(AuthorityRequest::AllianceChange {
            guild_a: guild_id,
            guild_b: peer_id,
            account_a: account_id,
            account_b: AccountId::NONE,
            flags: AllianceFlags::removal(kind),
        });
        Ok(())
    }

    /// Apply an authority acknowledgement of a relation change.
    pub fn alliance_ack(&mut self, ack: AllianceAck, now: Tick, ports: &mut Ports<'_>) {
        let AllianceAck {
            guild_a,
            guild_b,
            account_a,
            flags,
            name_a,
            name_b,
            ..
        } = ack;

        if flags.failed {
            warn!(guild_a = %guild_a, guild_b = %guild_b, kind = %flags.kind, "Relation change refused");
            if !flags.remove {
                let dropped = self.guilds.get_mut(guild_a).and_then(|g| {
                    let entry = g.relations.remove_kind(guild_b, flags.kind);
                    g.recompute_war();
                    entry
                });
                if flags.bilateral() {
                    if let Some(g) = self.guilds.get_mut(guild_b) {
                        g.relations.remove_kind(guild_a, flags.kind);
                    }
                } else if dropped.is_some_and(|e| e.war) {
                    // The refused declaration had reciprocated a war; the
                    // peer's entry goes back to a one-sided opposition.
                    if let Some(peer) = self.guilds.get_mut(guild_b) {
                        if let Some(back) = peer.relations.get_mut(guild_a) {
                            back.war = false;
                        }
                        peer.recompute_war();
                    }
                    self.lift_grace_if_peaceful(guild_a);
                    self.lift_grace_if_peaceful(guild_b);
                }
                self.show_relations(guild_a, ports);
                self.show_relations(guild_b, ports);
            }
            if let Some(char_id) = ports.sessions.by_account(account_a).map(|s| s.char_id) {
                ports
                    .presenter
                    .notify(char_id, Notification::text("The relation change was refused."));
            }
            return;
        }

        if flags.remove {
            self.apply_removal(guild_a, guild_b, flags.kind, ports);
            return;
        }

        let mut changed = self.ensure_relation(guild_a, guild_b, &name_b, flags.kind);
        if flags.bilateral() {
            changed |= self.ensure_relation(guild_b, guild_a, &name_a, flags.kind);
        }
        if changed {
            self.show_relations(guild_a, ports);
            if flags.bilateral() {
                self.show_relations(guild_b, ports);
            }
        }
        if flags.kind == RelationKind::Enemy {
            self.start_war_if_reciprocal(guild_a, guild_b, now, ports);
        }
    }

    // -----------------------------------------------------------------------
    // War
    // -----------------------------------------------------------------------

    /// Start a war between `a` and `b` if both hold enemy entries against
    /// each other and the pair is not already at war.
    fn start_war_if_reciprocal(&mut self, a: GuildId, b: GuildId, now: Tick, ports: &mut Ports<'_>) {
        if !self.config.war.enabled {
            return;
        }
        let (Some(ga), Some(gb)) = (self.guilds.get(a), self.guilds.get(b)) else {
            return;
        };
        let (Some(ea), Some(eb)) = (ga.relations.get(b), gb.relations.get(a)) else {
            return;
        };
        if ea.kind != RelationKind::Enemy || eb.kind != RelationKind::Enemy || (ea.war && eb.war) {
            return;
        }
        let (name_a, name_b) = (ga.name.clone(), gb.name.clone());

        for (side, peer) in [(a, b), (b, a)] {
            if let Some(entry) = self
                .guilds
                .get_mut(side)
                .and_then(|g| g.relations.get_mut(peer))
            {
                entry.war = true;
            }
        }
        self.war_init(a, &name_b, true, now, ports);
        self.war_init(b, &name_a, true, now, ports);
        ports
            .presenter
            .broadcast(&format!("Guild [{name_a}] and Guild [{name_b}] are now at War!!"));
        info!(guild_a = %a, guild_b = %b, "War started");
    }

    /// Put a guild on war footing against `enemy_name`.
    ///
    /// On a guild's first war, members in personal combat are pulled out
    /// of it unless their map forbids guild war. The grace lock is always
    /// armed. `starting` also
    /// tells the members war has begun.
    pub(crate) fn war_init(
        &mut self,
        guild_id: GuildId,
        enemy_name: &str,
        starting: bool,
        now: Tick,
        ports: &mut Ports<'_>,
    ) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        let already_at_war = guild.war;
        guild.war = true;
        if !already_at_war {
            for char_id in guild.bound_chars() {
                let Some(session) = ports.sessions.by_char_mut(char_id) else {
                    continue;
                };
                if session.personal_combat && !session.guild_war_forbidden {
                    session.personal_combat = false;
                    ports.hooks.leave_personal_combat(char_id);
                }
            }
        }
        if starting {
            let text = format!("Your Guild is at War with {enemy_name}.");
            ports.notify_all(guild, &Notification::text(text));
        }
        self.arm_grace(guild_id, now);
    }

    /// (Re)arm the grace lock, replacing any pending expiry timer.
    fn arm_grace(&mut self, guild_id: GuildId, now: Tick) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        let until = now.plus_secs(self.config.war.grace_secs);
        if let Some(previous) = guild.war_grace_timer.take() {
            self.timers.cancel(previous);
        }
        guild.war_grace_until = Some(until);
        guild.war_grace_timer = Some(self.timers.schedule(until, TimerKind::WarGrace { guild_id }));
    }

    /// Drop the grace lock of a guild left with no war.
    fn lift_grace_if_peaceful(&mut self, guild_id: GuildId) {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return;
        };
        if guild.war {
            return;
        }
        if let Some(timer) = guild.war_grace_timer.take() {
            self.timers.cancel(timer);
        }
        guild.war_grace_until = None;
    }

    /// Remove `a`'s relation of `kind` with `b` and everything that hangs
    /// off it: the mirrored ally entry, or the war on both sides.
    ///
    /// Returns whether anything was removed.
    pub(crate) fn apply_removal(
        &mut self,
        a: GuildId,
        b: GuildId,
        kind: RelationKind,
        ports: &mut Ports<'_>,
    ) -> bool {
        let Some(guild) = self.guilds.get_mut(a) else {
            return false;
        };
        let Some(entry) = guild.relations.remove_kind(b, kind) else {
            return false;
        };
        guild.recompute_war();
        let loser = guild.name.clone();
        let removed = Notification::RelationRemoved { guild_id: b, kind };
        ports.notify_all(guild, &removed);

        match kind {
            RelationKind::Ally => {
                if let Some(peer) = self.guilds.get_mut(b) {
                    if peer.relations.remove_kind(a, RelationKind::Ally).is_some() {
                        let mirrored = Notification::RelationRemoved {
                            guild_id: a,
                            kind: RelationKind::Ally,
                        };
                        ports.notify_all(peer, &mirrored);
                    }
                }
                self.show_relations(b, ports);
            }
            RelationKind::Enemy if entry.war => {
                let mut winner = entry.name;
                if let Some(peer) = self.guilds.get_mut(b) {
                    if let Some(back) = peer.relations.get_mut(a) {
                        back.war = false;
                    }
                    peer.recompute_war();
                    winner.clone_from(&peer.name);
                    let won = format!("Your Guild has won the War against {loser}.");
                    ports.notify_all(peer, &Notification::text(won));
                }
                if let Some(guild) = self.guilds.get(a) {
                    let lost = format!("Your Guild has surrendered to {winner}.");
                    ports.notify_all(guild, &Notification::text(lost));
                }
                ports
                    .presenter
                    .broadcast(&format!("Guild [{loser}] has surrendered to Guild [{winner}]."));
                info!(loser = %a, winner = %b, "War ended by surrender");
            }
            RelationKind::Enemy => {}
        }
        self.show_relations(a, ports);
        true
    }

    fn insert_relation(&mut self, guild_id: GuildId, entry: RelationEntry) -> bool {
        let Some(guild) = self.guilds.get_mut(guild_id) else {
            return false;
        };
        match guild.relations.insert(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(guild_id = %guild_id, error = %e, "Relation not stored");
                false
            }
        }
    }

    /// Make sure `guild_id` holds a relation of `kind` with `peer`.
    /// Returns whether an entry was added.
    fn ensure_relation(&mut self, guild_id: GuildId, peer: GuildId, name: &str, kind: RelationKind) -> bool {
        let held = self
            .guilds
            .get(guild_id)
            .is_some_and(|g| g.relations.holds(peer, kind));
        !held && self.insert_relation(guild_id, RelationEntry::new(peer, name, kind))
    }

    fn show_relations(&self, guild_id: GuildId, ports: &mut Ports<'_>) {
        if let Some(guild) = self.guilds.get(guild_id) {
            ports.show_all(guild, GuildView::Relations);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GuildConfig;

    fn state_with(guilds: &[(u32, &str)]) -> GuildState {
        let mut state = GuildState::new(GuildConfig::default());
        for &(id, name) in guilds {
            state.guilds.insert(Guild::new(GuildId::new(id), name, 8, 4, 4));
        }
        state
    }

    #[test]
    fn can_break_without_war() {
        let mut state = state_with(&[(1, "A"), (2, "B")]);
        state.insert_relation(
            GuildId::new(1),
            RelationEntry::new(GuildId::new(2), "B", RelationKind::Enemy),
        );
        assert!(state.can_break(GuildId::new(1), GuildId::new(2), Tick::ZERO));
        assert!(!state.is_enemy(GuildId::new(1), GuildId::new(2), Tick::ZERO));
    }

    #[test]
    fn grace_lock_blocks_only_war_entries() {
        let mut state = state_with(&[(1, "A"), (2, "B"), (3, "C")]);
        let mut war = RelationEntry::new(GuildId::new(2), "B", RelationKind::Enemy);
        war.war = true;
        state.insert_relation(GuildId::new(1), war);
        state.insert_relation(
            GuildId::new(1),
            RelationEntry::new(GuildId::new(3), "C", RelationKind::Enemy),
        );
        state.arm_grace(GuildId::new(1), Tick::ZERO);

        let soon = Tick::from_secs(10);
        assert!(!state.can_break(GuildId::new(1), GuildId::new(2), soon));
        assert!(state.can_break(GuildId::new(1), GuildId::new(3), soon));
        assert!(state.can_break(GuildId::new(1), GuildId::new(2), Tick::from_secs(600)));
    }

    #[test]
    fn rearming_grace_replaces_timer() {
        let mut state = state_with(&[(1, "A")]);
        state.arm_grace(GuildId::new(1), Tick::ZERO);
        let first = state.guild(GuildId::new(1)).unwrap().war_grace_timer.unwrap();
        state.arm_grace(GuildId::new(1), Tick::from_secs(30));
        let second = state.guild(GuildId::new(1)).unwrap().war_grace_timer.unwrap();

        assert_ne!(first, second);
        assert!(!state.timers.is_pending(first));
        assert_eq!(state.timers.len(), 1);
        assert_eq!(
            state.guild(GuildId::new(1)).unwrap().war_grace_until,
            Some(Tick::from_secs(630))
        );
    }

    #[test]
    fn alliance_count_by_kind() {
        let mut state = state_with(&[(1, "A")]);
        state.insert_relation(
            GuildId::new(1),
            RelationEntry::new(GuildId::new(2), "B", RelationKind::Ally),
        );
        state.insert_relation(
            GuildId::new(1),
            RelationEntry::new(GuildId::new(3), "C", RelationKind::Enemy),
        );
        assert_eq!(state.alliance_count(GuildId::new(1), RelationKind::Ally), 1);
        assert_eq!(state.alliance_count(GuildId::new(1), RelationKind::Enemy), 1);
        assert!(state.is_allied(GuildId::new(1), GuildId::new(2)));
        assert_eq!(state.alliance_count(GuildId::new(9), RelationKind::Ally), 0);
    }
}
