//! One-shot timer queue.
//!
//! Timers are ordered by deadline and fire on the caller's thread when
//! [`TimerQueue::pop_due`] is polled. A cancelled timer never fires.
//! Holders of a [`TimerId`] compare it against the id they stored to
//! detect a firing that was superseded.

use std::collections::{BTreeMap, HashMap};

use guild_types::{GuildId, Tick, TimerId};

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// A guild skill cooldown ends.
    SkillCooldown {
        /// Owning guild.
        guild_id: GuildId,
        /// Cooldown slot.
        slot: usize,
        /// Skill that was used.
        skill_id: u16,
    },
    /// A guild's war grace lock ends.
    WarGrace {
        /// Owning guild.
        guild_id: GuildId,
    },
}

/// Deadline-ordered queue of pending timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    pending: BTreeMap<(Tick, TimerId), TimerKind>,
    deadlines: HashMap<TimerId, Tick>,
}

impl TimerQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire at `at`.
    pub fn schedule(&mut self, at: Tick, kind: TimerKind) -> TimerId {
        self.next_id = self.next_id.saturating_add(1);
        let id = TimerId(self.next_id);
        self.pending.insert((at, id), kind);
        self.deadlines.insert(id, at);
        id
    }

    /// Cancel a timer. Returns whether it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(at) => self.pending.remove(&(at, id)).is_some(),
            None => false,
        }
    }

    /// Whether a timer is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Remove and return every timer due at or before `now`, earliest
    /// first.
    pub fn pop_due(&mut self, now: Tick) -> Vec<(TimerId, TimerKind)> {
        let mut due = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let (at, id) = *entry.key();
            if at > now {
                break;
            }
            let kind = entry.remove();
            self.deadlines.remove(&id);
            due.push((id, kind));
        }
        due
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Tick> {
        self.pending.keys().next().map(|(at, _)| *at)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grace(id: u32) -> TimerKind {
        TimerKind::WarGrace {
            guild_id: GuildId::new(id),
        }
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut q = TimerQueue::new();
        let late = q.schedule(Tick::from_secs(20), grace(1));
        let early = q.schedule(Tick::from_secs(10), grace(2));

        assert!(q.pop_due(Tick::from_secs(5)).is_empty());
        let due = q.pop_due(Tick::from_secs(30));
        let ids: Vec<TimerId> = due.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![early, late]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut q = TimerQueue::new();
        let id = q.schedule(Tick::from_secs(1), grace(1));
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        assert!(q.pop_due(Tick::from_secs(10)).is_empty());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut q = TimerQueue::new();
        let a = q.schedule(Tick::ZERO, grace(1));
        q.pop_due(Tick::ZERO);
        let b = q.schedule(Tick::ZERO, grace(1));
        assert_ne!(a, b);
        assert_eq!(q.next_deadline(), Some(Tick::ZERO));
    }
}
