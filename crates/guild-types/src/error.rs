//! Errors raised by the bounded tables in this crate.

use crate::ids::GuildId;

/// Failure to insert into a fixed-capacity table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// Every slot is occupied.
    #[error("table full ({capacity} slots)")]
    Full {
        /// The fixed slot count of the table.
        capacity: usize,
    },

    /// An entry for this peer guild already exists.
    #[error("relation with guild {0} already present")]
    Duplicate(GuildId),
}
