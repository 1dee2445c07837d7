//! Coalescing write-back cache for guild exp contributions.
//!
//! Every exp gain taxed by a guild lands here instead of going straight
//! to the authority. Entries are keyed by character and summed with
//! saturation; a periodic flush folds each entry into the member's
//! persisted exp and sends a single field update per character.
//! Released entries go back to a bounded pool for reuse.

use std::collections::HashMap;

use guild_types::{AccountId, AuthorityRequest, CharId, GuildId, MemberField};
use tracing::{debug, warn};

use crate::error::GuildError;
use crate::ports::{Ports, Session};
use crate::state::GuildState;

/// Pending contribution for one character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpEntry {
    /// Guild at the time of the first contribution.
    pub guild_id: GuildId,
    /// Contributing account.
    pub account_id: AccountId,
    /// Contributing character.
    pub char_id: CharId,
    /// Accumulated exp, saturating at `u64::MAX`.
    pub exp: u64,
}

impl ExpEntry {
    /// Add `amount`, saturating. Returns the new total.
    pub const fn add(&mut self, amount: u64) -> u64 {
        self.exp = self.exp.saturating_add(amount);
        self.exp
    }
}

/// Per-character accumulators plus a pool of released entries.
#[derive(Debug)]
pub struct ExpCache {
    live: HashMap<CharId, ExpEntry>,
    pool: Vec<ExpEntry>,
    pool_capacity: usize,
}

impl ExpCache {
    /// An empty cache keeping at most `pool_capacity` released entries.
    pub fn new(pool_capacity: usize) -> Self {
        Self {
            live: HashMap::new(),
            pool: Vec::new(),
            pool_capacity,
        }
    }

    /// The entry for the session's character, created on demand with the
    /// session's current guild and account.
    pub fn ensure(&mut self, session: &Session) -> &mut ExpEntry {
        let pool = &mut self.pool;
        self.live.entry(session.char_id).or_insert_with(|| {
            let mut entry = pool.pop().unwrap_or_default();
            entry.guild_id = session.guild_id;
            entry.account_id = session.account_id;
            entry.char_id = session.char_id;
            entry.exp = 0;
            entry
        })
    }

    /// Add `amount` for the session's character. Returns the new total.
    pub fn add(&mut self, session: &Session, amount: u64) -> u64 {
        self.ensure(session).add(amount)
    }

    /// Pending total for a character.
    pub fn pending(&self, char_id: CharId) -> Option<u64> {
        self.live.get(&char_id).map(|e| e.exp)
    }

    /// Take every live entry, ordered by character.
    pub fn take_all(&mut self) -> Vec<ExpEntry> {
        let mut entries: Vec<ExpEntry> = self.live.drain().map(|(_, e)| e).collect();
        entries.sort_unstable_by_key(|e| e.char_id);
        entries
    }

    /// Return an entry to the pool.
    pub fn release(&mut self, entry: ExpEntry) {
        if self.pool.len() < self.pool_capacity {
            self.pool.push(entry);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no entry is live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of pooled entries.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries written to a member and sent to the authority.
    pub written: usize,
    /// Entries whose guild or member had vanished.
    pub dropped: usize,
}

/// `rate` percent of `exp`, rounded down. Rates of 100 or more take
/// everything.
fn tax_share(exp: u64, rate: u64) -> u64 {
    if rate >= 100 {
        return exp;
    }
    // Split so the multiplication cannot overflow.
    let whole = (exp / 100).saturating_mul(rate);
    let rest = (exp % 100).saturating_mul(rate) / 100;
    whole.saturating_add(rest)
}

impl GuildState {
    /// Tax an exp gain for the session's guild.
    ///
    /// The tax rate is the session's position exp tax. Returns the amount
    /// taken (0 when the session has no guild, position, or tax).
    pub fn pay_exp(&mut self, char_id: CharId, exp: u64, ports: &Ports<'_>) -> u64 {
        let Some(session) = ports.sessions.by_char(char_id) else {
            return 0;
        };
        let Some(guild) = self.guilds.get(session.guild_id) else {
            return 0;
        };
        let Some(position) = guild.position_of(session.account_id, session.char_id) else {
            return 0;
        };
        let rate = u64::from(position.exp_tax);
        if rate == 0 {
            return 0;
        }
        let taxed = tax_share(exp, rate);
        if taxed == 0 {
            return 0;
        }
        self.exp.add(session, taxed);
        taxed
    }

    /// Contribute exp directly, without taxing.
    ///
    /// # Errors
    ///
    /// Returns [`GuildError::SessionNotFound`] for an unknown character.
    pub fn contribute_exp(
        &mut self,
        char_id: CharId,
        exp: u64,
        ports: &Ports<'_>,
    ) -> Result<u64, GuildError> {
        let session = ports
            .sessions
            .by_char(char_id)
            .ok_or(GuildError::SessionNotFound(char_id))?;
        if session.guild_id.is_none() {
            return Ok(0);
        }
        Ok(self.exp.add(session, exp))
    }

    /// Fold every pending entry into its member's exp.
    ///
    /// An entry whose guild or member slot has disappeared is dropped.
    pub fn flush_exp(&mut self, ports: &mut Ports<'_>) -> FlushReport {
        let mut report = FlushReport::default();
        for entry in self.exp.take_all() {
            let member = self
                .guilds
                .get_mut(entry.guild_id)
                .and_then(|g| g.member_mut(entry.account_id, entry.char_id));
            match member {
                Some(member) => {
                    member.exp = member.exp.saturating_add(entry.exp);
                    let total = member.exp;
                    ports.send(AuthorityRequest::UpdateMemberField {
                        guild_id: entry.guild_id,
                        account_id: entry.account_id,
                        char_id: entry.char_id,
                        field: MemberField::Exp(total),
                    });
                    report.written = report.written.saturating_add(1);
                }
                None => {
                    debug!(
                        guild_id = %entry.guild_id,
                        char_id = %entry.char_id,
                        exp = entry.exp,
                        "Dropping exp for departed member"
                    );
                    report.dropped = report.dropped.saturating_add(1);
                }
            }
            self.exp.release(entry);
        }
        if report.dropped > 0 {
            warn!(dropped = report.dropped, "Exp flush dropped entries");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(char_id: u32) -> Session {
        let mut s = Session::new(AccountId::new(char_id), CharId::new(char_id), "s");
        s.guild_id = GuildId::new(1);
        s
    }

    #[test]
    fn accumulates_per_character() {
        let mut cache = ExpCache::new(4);
        cache.add(&session(1), 10);
        cache.add(&session(1), 5);
        cache.add(&session(2), 7);
        assert_eq!(cache.pending(CharId::new(1)), Some(15));
        assert_eq!(cache.pending(CharId::new(2)), Some(7));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let mut cache = ExpCache::new(4);
        cache.add(&session(1), u64::MAX - 3);
        cache.add(&session(1), 2);
        let total = cache.add(&session(1), 10);
        assert_eq!(total, u64::MAX);
    }

    #[test]
    fn tax_share_is_exact_for_huge_gains() {
        assert_eq!(tax_share(1000, 20), 200);
        assert_eq!(tax_share(199, 50), 99);
        assert_eq!(tax_share(7, 0), 0);
        assert_eq!(tax_share(7, 100), 7);
        assert_eq!(tax_share(u64::MAX, 50), u64::MAX / 2);
        assert_eq!(tax_share(u64::MAX, 99), u64::MAX / 100 * 99 + 15 * 99 / 100);
    }

    #[test]
    fn released_entries_are_reused_and_reset() {
        let mut cache = ExpCache::new(1);
        cache.add(&session(1), 100);
        cache.add(&session(2), 100);
        for entry in cache.take_all() {
            cache.release(entry);
        }
        assert_eq!(cache.pooled(), 1);

        let entry = cache.ensure(&session(3));
        assert_eq!(entry.exp, 0);
        assert_eq!(entry.char_id, CharId::new(3));
        assert_eq!(cache.pooled(), 0);
    }
}
