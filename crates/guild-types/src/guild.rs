//! The guild aggregate record and its parts.
//!
//! A [`Guild`] is what the authority pushes in full. Most fields are
//! plain data copied from the authority. A few are local-only (marked
//! `#[serde(skip)]`): session bindings, the derived `war` flag, the war
//! grace lock, and timer handles. Those never travel over the wire and
//! are carried across full-record replacement by the cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::ids::{AccountId, CastleId, CharId, GuildId, InstanceId, Tick, TimerId};
use crate::relation::RelationTable;

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Permission bits attached to a guild position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u8);

impl Permissions {
    /// May invite new members.
    pub const INVITE: Self = Self(0x01);
    /// May expel members.
    pub const EXPEL: Self = Self(0x10);
    /// Every permission bit.
    pub const ALL: Self = Self(0x11);

    /// Build from raw bits, discarding unknown ones.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// The raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two permission sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A rank definition within a guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Display title.
    pub name: String,
    /// What members holding this position may do.
    pub permissions: Permissions,
    /// Percentage of earned exp paid to the guild (0-100).
    pub exp_tax: u8,
}

impl Position {
    /// Whether holders may invite.
    pub const fn can_invite(&self) -> bool {
        self.permissions.contains(Permissions::INVITE)
    }

    /// Whether holders may expel.
    pub const fn can_expel(&self) -> bool {
        self.permissions.contains(Permissions::EXPEL)
    }
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// A map coordinate reported for a member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapPosition {
    /// Map name.
    pub map: String,
    /// X cell.
    pub x: u16,
    /// Y cell.
    pub y: u16,
}

/// One slot of a guild roster.
///
/// `account_id == 0` marks an empty slot. The live session is never
/// owned here: `bound` only records that a session with this slot's
/// character id was attached, and callers look it up by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSlot {
    /// Owning account, or 0 for an empty slot.
    pub account_id: AccountId,
    /// Character occupying the slot.
    pub char_id: CharId,
    /// Character name.
    pub name: String,
    /// Base level.
    pub level: u16,
    /// Job class.
    pub class: u16,
    /// Whether the authority reports the character online.
    pub online: bool,
    /// Index into the guild's position table.
    pub position: usize,
    /// Exp contributed to the guild.
    pub exp: u64,
    /// A live session is attached to this slot.
    #[serde(skip)]
    pub bound: bool,
    /// Last coordinates presented to other members.
    #[serde(skip)]
    pub last_position: Option<MapPosition>,
}

impl MemberSlot {
    /// A filled slot for the given character.
    pub fn new(account_id: AccountId, char_id: CharId, name: impl Into<String>) -> Self {
        Self {
            account_id,
            char_id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether the slot is unoccupied.
    pub const fn is_empty(&self) -> bool {
        self.account_id.is_none()
    }

    /// Whether the slot holds exactly this account/character pair.
    pub fn is(&self, account_id: AccountId, char_id: CharId) -> bool {
        !self.is_empty() && self.account_id == account_id && self.char_id == char_id
    }
}

// ---------------------------------------------------------------------------
// Skills and scores
// ---------------------------------------------------------------------------

/// A learned guild skill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSkill {
    /// Skill identifier.
    pub id: u16,
    /// Learned level (0 = not learned).
    pub level: u8,
}

/// A guild's siege record for one castle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastleScore {
    /// Number of completed holds.
    pub capture: u32,
    /// Total seconds the castle was held under active-siege rules.
    pub possession_time: u64,
    /// Accumulated defensive score.
    pub defensive_score: u64,
    /// Total economy levels invested (saturating).
    pub invest_eco: u16,
    /// Total defense levels invested (saturating).
    pub invest_def: u16,
    /// Highest economy level seen.
    pub top_eco: u32,
    /// Highest defense level seen.
    pub top_def: u32,
    /// Modified since last saved to the authority.
    #[serde(skip)]
    pub dirty: bool,
}

/// Two-part guild notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildNotice {
    /// Short headline.
    pub headline: String,
    /// Body text.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

/// The per-guild aggregate mirrored from the authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    /// Authority-assigned identifier.
    pub id: GuildId,
    /// Guild name.
    pub name: String,
    /// Guild level.
    pub level: u16,
    /// Guild exp.
    pub exp: u64,
    /// Exp needed for the next level.
    pub next_exp: u64,
    /// Unspent skill points.
    pub skill_point: u16,
    /// Name of the guild master's character.
    pub master: String,
    /// Usable member slots (not more than `members.len()`).
    pub max_member: usize,
    /// Members currently online.
    pub connect_member: u16,
    /// Average base level of all members.
    pub average_level: u16,
    /// Roster slots. Slot 0 is the master.
    pub members: Vec<MemberSlot>,
    /// Position definitions. Position 0 is the master's.
    pub positions: Vec<Position>,
    /// Guild notice.
    pub notice: GuildNotice,
    /// Emblem version.
    pub emblem_id: u32,
    /// Emblem image data.
    pub emblem: Vec<u8>,
    /// Alliances and oppositions.
    pub relations: RelationTable,
    /// Learned skills.
    pub skills: Vec<GuildSkill>,
    /// Siege records, one per castle ever held.
    pub castle_scores: BTreeMap<CastleId, CastleScore>,
    /// Bound instanced dungeon, if any.
    pub instance_id: Option<InstanceId>,
    /// Derived: some relation entry is a reciprocated war.
    #[serde(skip)]
    pub war: bool,
    /// Oppositions in war cannot be broken before this tick.
    #[serde(skip)]
    pub war_grace_until: Option<Tick>,
    /// Timer clearing the grace lock.
    #[serde(skip)]
    pub war_grace_timer: Option<TimerId>,
    /// Per-skill cooldown timers.
    #[serde(skip)]
    pub skill_timers: Vec<Option<TimerId>>,
}

impl Guild {
    /// A new guild with empty, fixed-size tables.
    pub fn new(
        id: GuildId,
        name: impl Into<String>,
        member_slots: usize,
        position_slots: usize,
        relation_slots: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            level: 1,
            max_member: member_slots,
            members: vec![MemberSlot::default(); member_slots],
            positions: vec![Position::default(); position_slots],
            relations: RelationTable::with_capacity(relation_slots),
            ..Self::default()
        }
    }

    /// Usable roster slots.
    pub fn roster(&self) -> &[MemberSlot] {
        let usable = self.max_member.min(self.members.len());
        self.members.get(..usable).unwrap_or_default()
    }

    /// Index of the slot holding this account/character pair.
    pub fn member_index(&self, account_id: AccountId, char_id: CharId) -> Option<usize> {
        self.roster().iter().position(|m| m.is(account_id, char_id))
    }

    /// The slot holding this account/character pair.
    pub fn member(&self, account_id: AccountId, char_id: CharId) -> Option<&MemberSlot> {
        self.roster().iter().find(|m| m.is(account_id, char_id))
    }

    /// Mutable access to the slot holding this account/character pair.
    pub fn member_mut(&mut self, account_id: AccountId, char_id: CharId) -> Option<&mut MemberSlot> {
        let index = self.member_index(account_id, char_id)?;
        self.members.get_mut(index)
    }

    /// The slot holding this character, by character id only.
    pub fn member_by_char(&self, char_id: CharId) -> Option<&MemberSlot> {
        self.roster()
            .iter()
            .find(|m| !m.is_empty() && m.char_id == char_id)
    }

    /// Index of the slot holding a character with this name.
    pub fn member_index_by_name(&self, name: &str) -> Option<usize> {
        self.roster()
            .iter()
            .position(|m| !m.is_empty() && m.name == name)
    }

    /// First unoccupied usable slot.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.roster().iter().position(MemberSlot::is_empty)
    }

    /// Store `member` in the first unoccupied slot.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Full`] when every usable slot is taken.
    pub fn add_member(&mut self, member: MemberSlot) -> Result<usize, TableError> {
        let capacity = self.roster().len();
        let index = self
            .first_free_slot()
            .ok_or(TableError::Full { capacity })?;
        if let Some(slot) = self.members.get_mut(index) {
            *slot = member;
        }
        Ok(index)
    }

    /// Filled slots.
    pub fn filled(&self) -> impl Iterator<Item = &MemberSlot> {
        self.roster().iter().filter(|m| !m.is_empty())
    }

    /// Number of filled slots.
    pub fn member_count(&self) -> usize {
        self.filled().count()
    }

    /// Filled slots with a live session attached.
    pub fn bound_members(&self) -> impl Iterator<Item = &MemberSlot> {
        self.filled().filter(|m| m.bound)
    }

    /// Character ids of every member with a live session attached.
    pub fn bound_chars(&self) -> Vec<CharId> {
        self.bound_members().map(|m| m.char_id).collect()
    }

    /// The position held by a member.
    pub fn position_of(&self, account_id: AccountId, char_id: CharId) -> Option<&Position> {
        let member = self.member(account_id, char_id)?;
        self.positions.get(member.position)
    }

    /// Level of a learned skill, 0 if not learned.
    pub fn skill_level(&self, skill_id: u16) -> u8 {
        self.skills
            .iter()
            .find(|s| s.id == skill_id)
            .map_or(0, |s| s.level)
    }

    /// Recompute `connect_member` and `average_level` from the roster.
    pub fn recompute_presence(&mut self) {
        let mut online: u16 = 0;
        let mut total: u64 = 0;
        let mut count: u64 = 0;
        for member in self.filled() {
            if member.online {
                online = online.saturating_add(1);
            }
            total = total.saturating_add(u64::from(member.level));
            count = count.saturating_add(1);
        }
        self.connect_member = online;
        self.average_level = total
            .checked_div(count)
            .and_then(|avg| u16::try_from(avg).ok())
            .unwrap_or(0);
    }

    /// Recompute the derived `war` flag from the relation table.
    pub fn recompute_war(&mut self) {
        self.war = self.relations.has_war();
    }

    /// Move the member at `index` into slot 0, swapping with the current
    /// master. The old master takes the new master's previous position
    /// and the new master takes position 0.
    ///
    /// Returns `false` if `index` is 0 or out of range.
    pub fn promote_to_master(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.members.len() {
            return false;
        }
        self.members.swap(0, index);
        let new_master_old_position = self.members.first().map_or(0, |m| m.position);
        if let Some(old_master) = self.members.get_mut(index) {
            old_master.position = new_master_old_position;
        }
        if let Some(new_master) = self.members.first_mut() {
            new_master.position = 0;
            self.master.clone_from(&new_master.name);
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn guild_with(members: &[(u32, u32, &str, u16)]) -> Guild {
        let mut g = Guild::new(GuildId::new(1), "Valkyrie", 8, 4, 4);
        for &(account, char_id, name, level) in members {
            let mut slot = MemberSlot::new(AccountId::new(account), CharId::new(char_id), name);
            slot.level = level;
            g.add_member(slot).unwrap();
        }
        g
    }

    #[test]
    fn permissions_mask_unknown_bits() {
        let p = Permissions::from_bits(0xFF);
        assert_eq!(p, Permissions::ALL);
        assert!(Permissions::from_bits(0x01).contains(Permissions::INVITE));
        assert!(!Permissions::from_bits(0x01).contains(Permissions::EXPEL));
    }

    #[test]
    fn members_fill_first_empty_slot() {
        let mut g = guild_with(&[(1, 10, "a", 10), (2, 20, "b", 20), (3, 30, "c", 30)]);
        g.members[1] = MemberSlot::default();
        let index = g
            .add_member(MemberSlot::new(AccountId::new(4), CharId::new(40), "d"))
            .unwrap();
        assert_eq!(index, 1);
        assert_eq!(g.member_count(), 3);
    }

    #[test]
    fn add_member_respects_max_member() {
        let mut g = guild_with(&[(1, 10, "a", 1)]);
        g.max_member = 1;
        let result = g.add_member(MemberSlot::new(AccountId::new(2), CharId::new(20), "b"));
        assert!(matches!(result, Err(TableError::Full { capacity: 1 })));
    }

    #[test]
    fn presence_averages_levels() {
        let mut g = guild_with(&[(1, 10, "a", 10), (2, 20, "b", 21)]);
        g.members[0].online = true;
        g.recompute_presence();
        assert_eq!(g.connect_member, 1);
        assert_eq!(g.average_level, 15);
    }

    #[test]
    fn promote_swaps_into_slot_zero() {
        let mut g = guild_with(&[(1, 10, "master", 99), (2, 20, "heir", 50)]);
        g.members[1].position = 3;
        assert!(g.promote_to_master(1));
        assert_eq!(g.members[0].name, "heir");
        assert_eq!(g.members[0].position, 0);
        assert_eq!(g.members[1].name, "master");
        assert_eq!(g.members[1].position, 3);
        assert_eq!(g.master, "heir");
        assert!(!g.promote_to_master(0));
    }

    #[test]
    fn local_fields_do_not_serialize() {
        let mut g = guild_with(&[(1, 10, "a", 1)]);
        g.war = true;
        g.members[0].bound = true;
        let json = serde_json::to_string(&g).unwrap();
        let back: Guild = serde_json::from_str(&json).unwrap();
        assert!(!back.war);
        assert!(!back.members[0].bound);
        assert_eq!(back.members[0].name, "a");
    }
}
