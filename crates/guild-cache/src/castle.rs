//! Castle ownership, investment, and siege scoring.
//!
//! # Architecture
//!
//! [`CastleRegistry`] owns every configured [`Castle`] plus the
//! pending-write queue. All field mutations go through
//! [`GuildState::save_castle_field`], which applies the field's side
//! effects locally and then tries to persist it. When the authority
//! channel is down the write is parked in the queue, keyed by
//! `(castle, field)` so a later write to the same field replaces the
//! parked value. [`GuildState::authority_reconnected`] replays the queue.
//!
//! # Scoring
//!
//! A hold is worth `floor(held_secs / period) * (1 + floor(economy / step))`.
//! The periodic sweep credits whole periods only ([`accrue_periods`]) and
//! leaves the remainder on the hold clock. The ownership change credits
//! everything left ([`accrue_hold`]). Both use [`held_score`], so a hold
//! scores the same however the sweeps fall across it.

use std::collections::{BTreeMap, BTreeSet};

use guild_types::{
    AuthorityRequest, Castle, CastleField, CastleId, CastleRecord, CastleScore, GuildId, Tick,
};
use tracing::{debug, info, warn};

use crate::config::{CastleDefinition, SiegeConfig};
use crate::error::GuildError;
use crate::ports::Ports;
use crate::state::GuildState;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score earned by holding a castle for `held_secs` at `economy`.
pub fn held_score(held_secs: u64, economy: u32, siege: &SiegeConfig) -> u64 {
    let periods = held_secs.checked_div(siege.score_period_secs).unwrap_or(0);
    let multiplier = economy
        .checked_div(siege.economy_step)
        .unwrap_or(0)
        .saturating_add(1);
    periods.saturating_mul(u64::from(multiplier))
}

/// Credit the time since `castle.capture_tick` to `score` and restart
/// the hold clock at `now`.
///
/// Returns the score earned.
pub fn accrue_hold(castle: &mut Castle, score: &mut CastleScore, now: Tick, siege: &SiegeConfig) -> u64 {
    let held_secs = now.secs_since(castle.capture_tick);
    let earned = held_score(held_secs, castle.record.economy, siege);
    score.possession_time = score.possession_time.saturating_add(held_secs);
    score.defensive_score = score.defensive_score.saturating_add(earned);
    score.dirty = true;
    castle.capture_tick = now;
    earned
}

/// Credit the whole score periods held since `castle.capture_tick` and
/// advance the hold clock by exactly that much.
///
/// Returns the score earned.
pub fn accrue_periods(castle: &mut Castle, score: &mut CastleScore, now: Tick, siege: &SiegeConfig) -> u64 {
    let held_secs = now.secs_since(castle.capture_tick);
    let credited_secs = held_secs
        .checked_div(siege.score_period_secs)
        .unwrap_or(0)
        .saturating_mul(siege.score_period_secs);
    let earned = held_score(credited_secs, castle.record.economy, siege);
    score.possession_time = score.possession_time.saturating_add(credited_secs);
    score.defensive_score = score.defensive_score.saturating_add(earned);
    score.dirty = true;
    castle.capture_tick = castle.capture_tick.plus_secs(credited_secs);
    earned
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A castle write that could not reach the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    /// Castle written.
    pub castle_id: CastleId,
    /// Field written.
    pub field: CastleField,
    /// Last value written.
    pub value: u32,
}

/// Every configured castle, the pending-write queue, and which siege
/// rulesets are running.
#[derive(Debug, Default)]
pub struct CastleRegistry {
    castles: BTreeMap<CastleId, Castle>,
    pending: Vec<PendingWrite>,
    active_rulesets: BTreeSet<u8>,
    guardian_slots: u8,
}

impl CastleRegistry {
    /// Build from static definitions.
    pub fn from_definitions(definitions: &[CastleDefinition], guardian_slots: u8) -> Self {
        let castles = definitions
            .iter()
            .map(|d| {
                let id = CastleId::new(d.id);
                let castle = Castle::new(id, &d.map, &d.name, &d.event, d.ruleset, guardian_slots);
                (id, castle)
            })
            .collect();
        Self {
            castles,
            pending: Vec::new(),
            active_rulesets: BTreeSet::new(),
            guardian_slots,
        }
    }

    /// Add a castle, replacing one with the same id.
    pub fn insert(&mut self, castle: Castle) {
        self.castles.insert(castle.id, castle);
    }

    /// The castle with `id`.
    pub fn get(&self, id: CastleId) -> Option<&Castle> {
        self.castles.get(&id)
    }

    /// Mutable access to the castle with `id`.
    pub fn get_mut(&mut self, id: CastleId) -> Option<&mut Castle> {
        self.castles.get_mut(&id)
    }

    /// Every castle id, ascending.
    pub fn ids(&self) -> Vec<CastleId> {
        self.castles.keys().copied().collect()
    }

    /// Iterate castles by id.
    pub fn iter(&self) -> impl Iterator<Item = &Castle> {
        self.castles.values()
    }

    /// Castles owned by `guild_id`.
    pub fn owned_by(&self, guild_id: GuildId) -> Vec<CastleId> {
        self.castles
            .values()
            .filter(|c| guild_id.is_some() && c.owner() == guild_id)
            .map(|c| c.id)
            .collect()
    }

    /// Permanent guardian slots per castle.
    pub const fn guardian_slots(&self) -> u8 {
        self.guardian_slots
    }

    /// Whether `ruleset` is running.
    pub fn siege_active(&self, ruleset: u8) -> bool {
        self.active_rulesets.contains(&ruleset)
    }

    /// Whether any ruleset is running.
    pub fn any_siege_active(&self) -> bool {
        !self.active_rulesets.is_empty()
    }

    /// Whether the castle's map is under a running ruleset.
    pub fn under_active_siege(&self, id: CastleId) -> bool {
        self.get(id).is_some_and(|c| self.siege_active(c.ruleset))
    }

    /// Park a write, replacing any parked value for the same field.
    pub fn queue_pending(&mut self, write: PendingWrite) {
        match self
            .pending
            .iter_mut()
            .find(|p| p.castle_id == write.castle_id && p.field == write.field)
        {
            Some(existing) => existing.value = write.value,
            None => self.pending.push(write),
        }
    }

    /// Parked writes in discovery order.
    pub fn pending(&self) -> &[PendingWrite] {
        &self.pending
    }

    fn take_pending(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.pending)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl GuildState {
    /// Castles owned by a guild.
    pub fn castles_owned(&self, guild_id: GuildId) -> Vec<CastleId> {
        self.castles.owned_by(guild_id)
    }

    /// Write one castle field by wire index.
    ///
    /// # Errors
    ///
    /// - [`GuildError::UnknownField`] if `index` names no field.
    /// - [`GuildError::CastleNotFound`] if the castle is not configured.
    pub fn save_castle_field(
        &mut self,
        castle_id: CastleId,
        index: u32,
        value: u32,
        now: Tick,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let Some(field) = CastleField::from_index(index, self.castles.guardian_slots()) else {
            warn!(castle_id = %castle_id, index, "Unknown castle field index");
            return Err(GuildError::UnknownField { castle_id, index });
        };
        self.set_castle_field(castle_id, field, value, now, ports)
    }

    /// Write one castle field.
    ///
    /// # Errors
    ///
    /// Returns [`GuildError::CastleNotFound`] if the castle is not
    /// configured.
    pub fn set_castle_field(
        &mut self,
        castle_id: CastleId,
        field: CastleField,
        value: u32,
        now: Tick,
        ports: &mut Ports<'_>,
    ) -> Result<(), GuildError> {
        let under_siege = self.castles.under_active_siege(castle_id);
        let any_siege = self.castles.any_siege_active();
        let siege_rules = self.config.siege.clone();
        let castle = self
            .castles
            .get_mut(castle_id)
            .ok_or(GuildError::CastleNotFound(castle_id))?;

        match field {
            CastleField::Owner => {
                let departing = castle.owner();
                if departing.is_some() && under_siege {
                    if let Some(guild) = self.guilds.get_mut(departing) {
                        let score = guild.castle_scores.entry(castle_id).or_default();
                        let earned = accrue_hold(castle, score, now, &siege_rules);
                        debug!(
                            castle_id = %castle_id,
                            guild_id = %departing,
                            earned,
                            "Credited castle hold"
                        );
                    }
                }
                castle.capture_tick = now;
                castle.set(field, value);
                let owner = castle.owner();
                info!(castle_id = %castle_id, from = %departing, to = %owner, "Castle changed hands");
                ports.hooks.castle_owner_changed(castle_id, owner);
            }
            CastleField::Economy | CastleField::Defense => {
                let current = castle.get(field).unwrap_or(0);
                if value > current {
                    let owner = castle.owner();
                    if let Some(guild) = self.guilds.get_mut(owner) {
                        let score = guild.castle_scores.entry(castle_id).or_default();
                        let gained = u16::try_from(value.saturating_sub(current)).unwrap_or(u16::MAX);
                        if field == CastleField::Economy {
                            score.invest_eco = score.invest_eco.saturating_add(gained);
                            score.top_eco = score.top_eco.max(value);
                        } else {
                            score.invest_def = score.invest_def.saturating_add(gained);
                            score.top_def = score.top_def.max(value);
                        }
                        score.dirty = true;
                        if !any_siege {
                            let snapshot = score.clone();
                            score.dirty = false;
                            ports.send(AuthorityRequest::SaveScore {
                                guild_id: owner,
                                castle_id,
                                score: snapshot,
                            });
                        }
                    }
                }
                castle.set(field, value);
                if field == CastleField::Defense {
                    ports.hooks.castle_defense_changed(castle_id);
                }
            }
            _ => {
                castle.set(field, value);
            }
        }

        self.persist_castle_field(
            PendingWrite {
                castle_id,
                field,
                value,
            },
            ports,
        );
        Ok(())
    }

    fn persist_castle_field(&mut self, write: PendingWrite, ports: &mut Ports<'_>) {
        let request = AuthorityRequest::CastleDataSave {
            castle_id: write.castle_id,
            field: write.field,
            value: write.value,
        };
        if let Err(e) = ports.link.send(request) {
            warn!(
                castle_id = %write.castle_id,
                field = %write.field,
                error = %e,
                "Castle write queued until the authority returns"
            );
            self.castles.queue_pending(write);
        }
    }

    /// Replay every parked castle write once, in discovery order.
    ///
    /// Writes that fail again stay parked. Returns how many were sent.
    pub fn authority_reconnected(&mut self, ports: &mut Ports<'_>) -> usize {
        let mut sent: usize = 0;
        for write in self.castles.take_pending() {
            self.persist_castle_field(write, ports);
            if !self
                .castles
                .pending()
                .iter()
                .any(|p| p.castle_id == write.castle_id && p.field == write.field)
            {
                sent = sent.saturating_add(1);
            }
        }
        info!(replayed = sent, still_pending = self.castles.pending().len(), "Castle writes replayed");
        sent
    }

    /// Request persisted state for every configured castle.
    pub fn request_castle_data(&mut self, ports: &mut Ports<'_>) {
        let castle_ids = self.castles.ids();
        ports.send(AuthorityRequest::CastleDataLoad { castle_ids });
    }

    /// Apply persisted castle state.
    ///
    /// Owners are fetched; the last owned castle's guild carries the
    /// siege init events. With no owned castle, the events run at once.
    pub fn castle_data_loaded(&mut self, records: Vec<CastleRecord>, ports: &mut Ports<'_>) {
        let guardian_slots = usize::from(self.castles.guardian_slots());
        let mut owners: Vec<GuildId> = Vec::new();
        for mut record in records {
            let Some(castle) = self.castles.get_mut(record.castle_id) else {
                warn!(castle_id = %record.castle_id, "Loaded data for unknown castle");
                continue;
            };
            record.guardians.resize(guardian_slots, false);
            if record.owner.is_some() {
                owners.push(record.owner);
            }
            castle.record = record;
        }
        info!(owned = owners.len(), "Castle data loaded");

        match owners.split_last() {
            None => {
                ports.hooks.run_event("::OnAgitInit");
                ports.hooks.run_event("::OnAgitInit2");
            }
            Some((&last, rest)) => {
                for &owner in rest {
                    self.request_info(owner, ports);
                }
                self.request_info_with(last, "::OnAgitInit", ports);
                self.request_info_with(last, "::OnAgitInit2", ports);
            }
        }
    }

    /// Begin a siege for `ruleset`. Owned castles under it restart their
    /// hold clock.
    pub fn siege_start(&mut self, ruleset: u8, now: Tick) {
        self.castles.active_rulesets.insert(ruleset);
        for castle in self.castles.castles.values_mut() {
            if castle.ruleset == ruleset && castle.owner().is_some() {
                castle.capture_tick = now;
            }
        }
        info!(ruleset, "Siege started");
    }

    /// End a siege for `ruleset`, scoring it one last time.
    pub fn siege_end(&mut self, ruleset: u8, now: Tick, ports: &mut Ports<'_>) {
        if !self.castles.siege_active(ruleset) {
            return;
        }
        self.score_castles(Some(ruleset), now, ports);
        self.castles.active_rulesets.remove(&ruleset);
        info!(ruleset, "Siege ended");
    }

    /// Periodic scoring sweep over every running ruleset.
    pub fn siege_sweep(&mut self, now: Tick, ports: &mut Ports<'_>) {
        if self.castles.any_siege_active() {
            self.score_castles(None, now, ports);
        }
    }

    fn score_castles(&mut self, only: Option<u8>, now: Tick, ports: &mut Ports<'_>) {
        let siege_rules = self.config.siege.clone();
        let active = self.castles.active_rulesets.clone();
        for castle in self.castles.castles.values_mut() {
            let owner = castle.owner();
            if owner.is_none()
                || !active.contains(&castle.ruleset)
                || only.is_some_and(|r| r != castle.ruleset)
            {
                continue;
            }
            let Some(guild) = self.guilds.get_mut(owner) else {
                continue;
            };
            let score = guild.castle_scores.entry(castle.id).or_default();
            score.capture = score.capture.saturating_add(1);
            accrue_periods(castle, score, now, &siege_rules);

            for char_id in guild.bound_chars() {
                if let Some(session) = ports.sessions.by_char_mut(char_id) {
                    session.capture_count = session.capture_count.saturating_add(1);
                }
            }
        }
        self.save_dirty_scores(ports);
    }

    /// Send every dirty score record and clear the flags.
    pub fn save_dirty_scores(&mut self, ports: &mut Ports<'_>) {
        for guild in self.guilds.iter_mut() {
            for (&castle_id, score) in &mut guild.castle_scores {
                if !score.dirty {
                    continue;
                }
                score.dirty = false;
                ports.send(AuthorityRequest::SaveScore {
                    guild_id: guild.id,
                    castle_id,
                    score: score.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_formula() {
        let siege = SiegeConfig::default();
        assert_eq!(held_score(900, 30, &siege), 6);
        assert_eq!(held_score(299, 100, &siege), 0);
        assert_eq!(held_score(600, 0, &siege), 2);
        assert_eq!(held_score(300, 24, &siege), 1);
        assert_eq!(held_score(300, 25, &siege), 2);
    }

    #[test]
    fn zero_period_scores_nothing() {
        let siege = SiegeConfig {
            score_period_secs: 0,
            economy_step: 0,
        };
        assert_eq!(held_score(10_000, 50, &siege), 0);
    }

    #[test]
    fn accrue_restarts_clock() {
        let mut castle = Castle::new(CastleId::new(1), "m", "n", "E", 1, 0);
        castle.record.economy = 30;
        castle.capture_tick = Tick::from_secs(100);
        let mut score = CastleScore::default();

        let earned = accrue_hold(&mut castle, &mut score, Tick::from_secs(1000), &SiegeConfig::default());
        assert_eq!(earned, 6);
        assert_eq!(score.possession_time, 900);
        assert_eq!(score.defensive_score, 6);
        assert!(score.dirty);
        assert_eq!(castle.capture_tick, Tick::from_secs(1000));
    }

    #[test]
    fn periods_keep_the_remainder_on_the_clock() {
        let mut castle = Castle::new(CastleId::new(1), "m", "n", "E", 1, 0);
        castle.capture_tick = Tick::from_secs(100);
        let mut score = CastleScore::default();
        let siege = SiegeConfig::default();

        assert_eq!(accrue_periods(&mut castle, &mut score, Tick::from_secs(350), &siege), 0);
        assert_eq!(castle.capture_tick, Tick::from_secs(100));

        assert_eq!(accrue_periods(&mut castle, &mut score, Tick::from_secs(750), &siege), 2);
        assert_eq!(castle.capture_tick, Tick::from_secs(700));
        assert_eq!(score.possession_time, 600);
    }

    #[test]
    fn pending_writes_coalesce_per_field() {
        let mut registry = CastleRegistry::default();
        let write = |field, value| PendingWrite {
            castle_id: CastleId::new(1),
            field,
            value,
        };
        registry.queue_pending(write(CastleField::Economy, 1));
        registry.queue_pending(write(CastleField::Defense, 5));
        registry.queue_pending(write(CastleField::Economy, 2));
        registry.queue_pending(write(CastleField::Economy, 3));

        assert_eq!(registry.pending().len(), 2);
        assert_eq!(registry.pending().first().map(|p| p.value), Some(3));
    }
}
