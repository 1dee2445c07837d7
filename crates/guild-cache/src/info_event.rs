//! Deferred callbacks waiting for a guild record.
//!
//! When a script needs a guild that is not cached yet, its event name is
//! parked here under the guild id. The first registration for an id is
//! what triggers the authority fetch; later ones just queue behind it.
//! When the record arrives the whole chain is resolved, newest first.

use std::collections::{HashMap, VecDeque};

use guild_types::GuildId;

/// Per-guild chains of pending event names.
#[derive(Debug, Default)]
pub struct InfoEventQueue {
    chains: HashMap<GuildId, VecDeque<String>>,
}

impl InfoEventQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `event` until `guild_id` arrives.
    ///
    /// Returns `true` if this is the first registration for the id, in
    /// which case the caller must request the record.
    pub fn register(&mut self, guild_id: GuildId, event: impl Into<String>) -> bool {
        let chain = self.chains.entry(guild_id).or_default();
        let first = chain.is_empty();
        chain.push_front(event.into());
        first
    }

    /// Remove the chain for `guild_id`, newest registration first.
    pub fn resolve(&mut self, guild_id: GuildId) -> Vec<String> {
        self.chains
            .remove(&guild_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Whether anything waits on `guild_id`.
    pub fn is_waiting(&self, guild_id: GuildId) -> bool {
        self.chains.contains_key(&guild_id)
    }

    /// Number of parked events across all guilds.
    pub fn len(&self) -> usize {
        self.chains.values().map(VecDeque::len).sum()
    }

    /// Whether nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Drop every chain. Only used on shutdown; returns what was dropped.
    pub fn drain_all(&mut self) -> Vec<(GuildId, String)> {
        let mut dropped: Vec<(GuildId, String)> = self
            .chains
            .drain()
            .flat_map(|(id, chain)| chain.into_iter().map(move |e| (id, e)))
            .collect();
        dropped.sort_unstable();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_requests_fetch() {
        let mut q = InfoEventQueue::new();
        assert!(q.register(GuildId::new(1), "A::OnInit"));
        assert!(!q.register(GuildId::new(1), "B::OnInit"));
        assert!(q.register(GuildId::new(2), "C::OnInit"));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn resolve_is_newest_first_and_removes_chain() {
        let mut q = InfoEventQueue::new();
        q.register(GuildId::new(1), "first");
        q.register(GuildId::new(1), "second");
        q.register(GuildId::new(1), "third");

        assert_eq!(q.resolve(GuildId::new(1)), vec!["third", "second", "first"]);
        assert!(!q.is_waiting(GuildId::new(1)));
        assert!(q.resolve(GuildId::new(1)).is_empty());
        assert!(q.register(GuildId::new(1), "again"));
    }

    #[test]
    fn drain_all_empties_queue() {
        let mut q = InfoEventQueue::new();
        q.register(GuildId::new(2), "x");
        q.register(GuildId::new(1), "y");
        let dropped = q.drain_all();
        assert_eq!(dropped.len(), 2);
        assert!(q.is_empty());
    }
}
