//! Type-safe identifier wrappers around authority-assigned integers.
//!
//! Every entity the guild cache tracks has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. IDs are assigned by the
//! authority process; the value `0` is reserved and means "none" (an empty
//! member slot, an unowned castle, a session without a guild).

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u32` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved "none" value.
            pub const NONE: Self = Self(0);

            /// Wrap a raw identifier.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the inner integer value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }

            /// Whether this is the reserved "none" value.
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }

            /// Whether this refers to an actual entity.
            pub const fn is_some(self) -> bool {
                self.0 != 0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a guild.
    GuildId
}

define_id! {
    /// Unique identifier for a player account.
    AccountId
}

define_id! {
    /// Unique identifier for a character. One account owns many characters.
    CharId
}

define_id! {
    /// Unique identifier for a siege castle.
    CastleId
}

define_id! {
    /// Unique identifier for an instanced dungeon bound to a guild.
    InstanceId
}

/// A point on the monotonic tick source, in milliseconds.
///
/// Ticks never go backwards. All durations derived from ticks saturate
/// at zero instead of underflowing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    /// The origin of the tick source.
    pub const ZERO: Self = Self(0);

    /// Build a tick from a millisecond count.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Build a tick from a second count.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Milliseconds since the origin.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The tick `millis` milliseconds later.
    pub const fn plus_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// The tick `secs` seconds later.
    pub const fn plus_secs(self, secs: u64) -> Self {
        self.plus_millis(secs.saturating_mul(1000))
    }

    /// Whole seconds elapsed between `earlier` and `self` (zero if
    /// `earlier` is in the future).
    pub const fn secs_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0) / 1000
    }
}

impl core::fmt::Display for Tick {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Handle returned by the timer queue. Handles are never reused, so a
/// stale handle can be detected by comparing against the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

impl core::fmt::Display for TimerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_none() {
        assert!(GuildId::NONE.is_none());
        assert!(GuildId::new(7).is_some());
        assert_eq!(u32::from(CastleId::from(24)), 24);
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&CharId::new(150_001)).unwrap_or_default();
        assert_eq!(json, "150001");
    }

    #[test]
    fn tick_arithmetic_saturates() {
        let t = Tick::from_secs(10);
        assert_eq!(t.secs_since(Tick::from_secs(4)), 6);
        assert_eq!(Tick::from_secs(4).secs_since(t), 0);
        assert_eq!(Tick(u64::MAX).plus_secs(5), Tick(u64::MAX));
        assert_eq!(t.plus_millis(1500).as_millis(), 11_500);
    }
}
