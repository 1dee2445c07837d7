//! Siege castle records.
//!
//! A [`Castle`] is created once from static configuration and lives for
//! the whole process. Its persistent fields are addressed by a semantic
//! [`CastleField`] index when written to the authority.

use serde::{Deserialize, Serialize};

use crate::ids::{CastleId, GuildId, Tick};

/// Semantic index of a persisted castle field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastleField {
    /// Owning guild id.
    Owner,
    /// Economy level.
    Economy,
    /// Defense level.
    Defense,
    /// Economy was raised today.
    TriggerEconomy,
    /// Defense was raised today.
    TriggerDefense,
    /// Next scheduled payment time.
    NextTime,
    /// Payment interval.
    PayTime,
    /// Creation time of the current ownership.
    CreateTime,
    /// Combined guardian visibility bits.
    VisibleCombined,
    /// Visibility of one permanent guardian.
    Guardian(u8),
}

impl CastleField {
    /// First wire index used by guardian slots.
    pub const GUARDIAN_BASE: u32 = 10;

    /// Decode a wire index. `guardian_slots` bounds the guardian range.
    pub fn from_index(index: u32, guardian_slots: u8) -> Option<Self> {
        match index {
            1 => Some(Self::Owner),
            2 => Some(Self::Economy),
            3 => Some(Self::Defense),
            4 => Some(Self::TriggerEconomy),
            5 => Some(Self::TriggerDefense),
            6 => Some(Self::NextTime),
            7 => Some(Self::PayTime),
            8 => Some(Self::CreateTime),
            9 => Some(Self::VisibleCombined),
            n => {
                let slot = n.checked_sub(Self::GUARDIAN_BASE)?;
                let slot = u8::try_from(slot).ok()?;
                (slot < guardian_slots).then_some(Self::Guardian(slot))
            }
        }
    }

    /// Encode as a wire index.
    pub fn index(self) -> u32 {
        match self {
            Self::Owner => 1,
            Self::Economy => 2,
            Self::Defense => 3,
            Self::TriggerEconomy => 4,
            Self::TriggerDefense => 5,
            Self::NextTime => 6,
            Self::PayTime => 7,
            Self::CreateTime => 8,
            Self::VisibleCombined => 9,
            Self::Guardian(slot) => Self::GUARDIAN_BASE.saturating_add(u32::from(slot)),
        }
    }
}

impl core::fmt::Display for CastleField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Guardian(slot) => write!(f, "guardian[{slot}]"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Persisted castle state exchanged with the authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastleRecord {
    /// Castle identifier.
    pub castle_id: CastleId,
    /// Owning guild, or 0.
    pub owner: GuildId,
    /// Economy level.
    pub economy: u32,
    /// Defense level.
    pub defense: u32,
    /// Economy raised today.
    pub trigger_economy: u32,
    /// Defense raised today.
    pub trigger_defense: u32,
    /// Next payment time.
    pub next_time: u32,
    /// Payment interval.
    pub pay_time: u32,
    /// Creation time.
    pub create_time: u32,
    /// Combined guardian visibility bits.
    pub visible_combined: u32,
    /// Per-guardian visibility.
    pub guardians: Vec<bool>,
}

/// A castle as held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Castle {
    /// Castle identifier.
    pub id: CastleId,
    /// Map the castle sits on.
    pub map: String,
    /// Display name.
    pub name: String,
    /// Event-hook prefix, e.g. `Agit_A01`.
    pub event: String,
    /// Siege ruleset the castle's map belongs to.
    pub ruleset: u8,
    /// Persisted fields.
    pub record: CastleRecord,
    /// When the current owner took the castle.
    pub capture_tick: Tick,
    /// Temporary guardians spawned for this castle.
    pub temp_guardians: Vec<u32>,
}

impl Castle {
    /// A fresh, unowned castle with `guardian_slots` hidden guardians.
    pub fn new(
        id: CastleId,
        map: impl Into<String>,
        name: impl Into<String>,
        event: impl Into<String>,
        ruleset: u8,
        guardian_slots: u8,
    ) -> Self {
        Self {
            id,
            map: map.into(),
            name: name.into(),
            event: event.into(),
            ruleset,
            record: CastleRecord {
                castle_id: id,
                guardians: vec![false; usize::from(guardian_slots)],
                ..CastleRecord::default()
            },
            capture_tick: Tick::ZERO,
            temp_guardians: Vec::new(),
        }
    }

    /// Current owner, 0 when unowned.
    pub const fn owner(&self) -> GuildId {
        self.record.owner
    }

    /// Name of a hook event on this castle, e.g. `Agit_A01::OnGuildBreak`.
    pub fn event_name(&self, label: &str) -> String {
        format!("{}::{label}", self.event)
    }

    /// Current value of a field.
    pub fn get(&self, field: CastleField) -> Option<u32> {
        let r = &self.record;
        match field {
            CastleField::Owner => Some(r.owner.into_inner()),
            CastleField::Economy => Some(r.economy),
            CastleField::Defense => Some(r.defense),
            CastleField::TriggerEconomy => Some(r.trigger_economy),
            CastleField::TriggerDefense => Some(r.trigger_defense),
            CastleField::NextTime => Some(r.next_time),
            CastleField::PayTime => Some(r.pay_time),
            CastleField::CreateTime => Some(r.create_time),
            CastleField::VisibleCombined => Some(r.visible_combined),
            CastleField::Guardian(slot) => r
                .guardians
                .get(usize::from(slot))
                .map(|&visible| u32::from(visible)),
        }
    }

    /// Overwrite a field. Returns `false` for an out-of-range guardian.
    pub fn set(&mut self, field: CastleField, value: u32) -> bool {
        let r = &mut self.record;
        match field {
            CastleField::Owner => r.owner = GuildId::new(value),
            CastleField::Economy => r.economy = value,
            CastleField::Defense => r.defense = value,
            CastleField::TriggerEconomy => r.trigger_economy = value,
            CastleField::TriggerDefense => r.trigger_defense = value,
            CastleField::NextTime => r.next_time = value,
            CastleField::PayTime => r.pay_time = value,
            CastleField::CreateTime => r.create_time = value,
            CastleField::VisibleCombined => r.visible_combined = value,
            CastleField::Guardian(slot) => match r.guardians.get_mut(usize::from(slot)) {
                Some(visible) => *visible = value != 0,
                None => return false,
            },
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_index_decoding() {
        assert_eq!(CastleField::from_index(1, 8), Some(CastleField::Owner));
        assert_eq!(CastleField::from_index(9, 8), Some(CastleField::VisibleCombined));
        assert_eq!(CastleField::from_index(10, 8), Some(CastleField::Guardian(0)));
        assert_eq!(CastleField::from_index(17, 8), Some(CastleField::Guardian(7)));
        assert_eq!(CastleField::from_index(18, 8), None);
        assert_eq!(CastleField::from_index(0, 8), None);
        assert_eq!(CastleField::Guardian(3).index(), 13);
    }

    #[test]
    fn set_and_get_fields() {
        let mut castle = Castle::new(CastleId::new(0), "prtg_cas01", "Kriemhild", "Agit_A01", 1, 2);
        assert!(castle.set(CastleField::Economy, 30));
        assert!(castle.set(CastleField::Guardian(1), 1));
        assert!(!castle.set(CastleField::Guardian(5), 1));
        assert_eq!(castle.get(CastleField::Economy), Some(30));
        assert_eq!(castle.get(CastleField::Guardian(1)), Some(1));
        assert_eq!(castle.event_name("OnGuildBreak"), "Agit_A01::OnGuildBreak");
    }
}
