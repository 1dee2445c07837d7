//! The guild record store.
//!
//! [`GuildRegistry`] exclusively owns every cached [`Guild`]. Lookup by
//! id is a hash-map probe; lookup by name is a linear scan, which is
//! acceptable for the rare administrative callers that need it.

use std::collections::HashMap;

use guild_types::{Guild, GuildId};

/// Cached guild records keyed by id.
#[derive(Debug, Default)]
pub struct GuildRegistry {
    guilds: HashMap<GuildId, Guild>,
}

impl GuildRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached record for `id`.
    pub fn get(&self, id: GuildId) -> Option<&Guild> {
        self.guilds.get(&id)
    }

    /// Mutable access to the cached record for `id`.
    pub fn get_mut(&mut self, id: GuildId) -> Option<&mut Guild> {
        self.guilds.get_mut(&id)
    }

    /// Whether `id` is cached.
    pub fn contains(&self, id: GuildId) -> bool {
        self.guilds.contains_key(&id)
    }

    /// Case-insensitive lookup by guild name.
    pub fn by_name(&self, name: &str) -> Option<&Guild> {
        self.guilds
            .values()
            .find(|g| g.name.eq_ignore_ascii_case(name))
    }

    /// Store a record, returning the one it replaced.
    pub fn insert(&mut self, guild: Guild) -> Option<Guild> {
        self.guilds.insert(guild.id, guild)
    }

    /// Remove a record.
    pub fn remove(&mut self, id: GuildId) -> Option<Guild> {
        self.guilds.remove(&id)
    }

    /// Every cached id, sorted.
    pub fn ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self.guilds.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate cached records.
    pub fn iter(&self) -> impl Iterator<Item = &Guild> {
        self.guilds.values()
    }

    /// Iterate cached records mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Guild> {
        self.guilds.values_mut()
    }

    /// Number of cached guilds.
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_ignores_case() {
        let mut registry = GuildRegistry::new();
        registry.insert(Guild::new(GuildId::new(3), "Iron Wolves", 4, 2, 2));
        assert_eq!(registry.by_name("iron wolves").map(|g| g.id), Some(GuildId::new(3)));
        assert!(registry.by_name("Iron").is_none());
    }

    #[test]
    fn insert_replaces() {
        let mut registry = GuildRegistry::new();
        assert!(registry.insert(Guild::new(GuildId::new(1), "A", 4, 2, 2)).is_none());
        let old = registry.insert(Guild::new(GuildId::new(1), "B", 4, 2, 2));
        assert_eq!(old.map(|g| g.name), Some("A".to_owned()));
        assert_eq!(registry.len(), 1);
    }
}
