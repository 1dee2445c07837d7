//! Fixed-capacity table of a guild's relationships with other guilds.
//!
//! A [`RelationTable`] has a fixed number of slots set at construction.
//! Insertion fills the first empty slot and fails once every slot is
//! taken. At most one entry exists per peer guild.

use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::ids::GuildId;

/// The kind of relationship a guild holds toward a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Mutual alliance. Always held symmetrically by both guilds.
    Ally,
    /// Opposition. May be unilateral or reciprocated.
    Enemy,
}

impl core::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Ally => write!(f, "ally"),
            Self::Enemy => write!(f, "enemy"),
        }
    }
}

/// One relationship from the owning guild toward a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEntry {
    /// The peer guild.
    pub guild_id: GuildId,
    /// The peer's name when the relation was recorded. May be stale.
    pub name: String,
    /// Ally or enemy.
    pub kind: RelationKind,
    /// Set only on enemy entries whose peer holds an enemy entry back.
    #[serde(default)]
    pub war: bool,
}

impl RelationEntry {
    /// A fresh entry with no war flag.
    pub fn new(guild_id: GuildId, name: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            guild_id,
            name: name.into(),
            kind,
            war: false,
        }
    }

    /// Whether this is a reciprocated opposition.
    pub const fn is_war(&self) -> bool {
        self.war && matches!(self.kind, RelationKind::Enemy)
    }
}

/// Bounded relation slots for a single guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationTable {
    slots: Vec<Option<RelationEntry>>,
}

impl RelationTable {
    /// Create an empty table with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Number of slots, filled or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no slot is filled.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Grow or shrink the slot count. Shrinking drops trailing entries.
    pub fn resize(&mut self, capacity: usize) {
        self.slots.resize(capacity, None);
    }

    /// Look up the entry for `peer`.
    pub fn get(&self, peer: GuildId) -> Option<&RelationEntry> {
        self.slots.iter().flatten().find(|e| e.guild_id == peer)
    }

    /// Mutable lookup of the entry for `peer`.
    pub fn get_mut(&mut self, peer: GuildId) -> Option<&mut RelationEntry> {
        self.slots.iter_mut().flatten().find(|e| e.guild_id == peer)
    }

    /// Whether an entry of `kind` exists for `peer`.
    pub fn holds(&self, peer: GuildId, kind: RelationKind) -> bool {
        self.get(peer).is_some_and(|e| e.kind == kind)
    }

    /// Number of entries of the given kind.
    pub fn count(&self, kind: RelationKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Whether any entry is a reciprocated war.
    pub fn has_war(&self) -> bool {
        self.iter().any(RelationEntry::is_war)
    }

    /// Store `entry` in the first empty slot.
    ///
    /// # Errors
    ///
    /// - [`TableError::Duplicate`] if an entry for the same peer exists.
    /// - [`TableError::Full`] if every slot is taken.
    pub fn insert(&mut self, entry: RelationEntry) -> Result<(), TableError> {
        if self.get(entry.guild_id).is_some() {
            return Err(TableError::Duplicate(entry.guild_id));
        }
        let capacity = self.capacity();
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(TableError::Full { capacity })?;
        *slot = Some(entry);
        Ok(())
    }

    /// Remove the entry for `peer` regardless of kind.
    pub fn remove(&mut self, peer: GuildId) -> Option<RelationEntry> {
        self.slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|e| e.guild_id == peer))
            .and_then(Option::take)
    }

    /// Remove the entry for `peer` only if it has the given kind.
    pub fn remove_kind(&mut self, peer: GuildId, kind: RelationKind) -> Option<RelationEntry> {
        if self.holds(peer, kind) {
            self.remove(peer)
        } else {
            None
        }
    }

    /// Iterate filled entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationEntry> {
        self.slots.iter().flatten()
    }

    /// Iterate filled entries mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RelationEntry> {
        self.slots.iter_mut().flatten()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ally(id: u32) -> RelationEntry {
        RelationEntry::new(GuildId::new(id), format!("G{id}"), RelationKind::Ally)
    }

    fn enemy(id: u32) -> RelationEntry {
        RelationEntry::new(GuildId::new(id), format!("G{id}"), RelationKind::Enemy)
    }

    #[test]
    fn insert_fills_first_empty_slot() {
        let mut table = RelationTable::with_capacity(3);
        table.insert(ally(1)).unwrap();
        table.insert(enemy(2)).unwrap();
        table.remove(GuildId::new(1));
        table.insert(enemy(3)).unwrap();

        let order: Vec<u32> = table.iter().map(|e| e.guild_id.into_inner()).collect();
        assert_eq!(order, vec![3, 2]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn insert_rejects_when_full() {
        let mut table = RelationTable::with_capacity(1);
        table.insert(ally(1)).unwrap();
        let result = table.insert(ally(2));
        assert!(matches!(result, Err(TableError::Full { capacity: 1 })));
    }

    #[test]
    fn one_entry_per_peer() {
        let mut table = RelationTable::with_capacity(4);
        table.insert(enemy(5)).unwrap();
        let result = table.insert(ally(5));
        assert!(matches!(result, Err(TableError::Duplicate(id)) if id == GuildId::new(5)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn counts_by_kind_and_war() {
        let mut table = RelationTable::with_capacity(4);
        table.insert(ally(1)).unwrap();
        table.insert(enemy(2)).unwrap();
        table.insert(enemy(3)).unwrap();
        assert_eq!(table.count(RelationKind::Ally), 1);
        assert_eq!(table.count(RelationKind::Enemy), 2);
        assert!(!table.has_war());

        table.get_mut(GuildId::new(3)).unwrap().war = true;
        assert!(table.has_war());
    }

    #[test]
    fn remove_kind_ignores_other_kind() {
        let mut table = RelationTable::with_capacity(2);
        table.insert(ally(1)).unwrap();
        assert!(table.remove_kind(GuildId::new(1), RelationKind::Enemy).is_none());
        assert!(table.remove_kind(GuildId::new(1), RelationKind::Ally).is_some());
        assert!(table.is_empty());
    }
}
