//! Monotonic tick sources.
//!
//! Every time-dependent operation takes the current [`Tick`] as an
//! argument; a [`Clock`] is how the driver obtains it.
//! [`MonotonicClock`] follows wall time, [`ManualClock`] only moves when
//! told to.

use std::time::Instant;

use guild_types::Tick;

/// Source of the current tick.
pub trait Clock {
    /// The current tick. Never decreases.
    fn now(&self) -> Tick;
}

/// Ticks elapsed since construction, from [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start counting from now.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        let millis = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        Tick::from_millis(millis)
    }
}

/// A clock advanced explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    now: Tick,
}

impl ManualClock {
    /// A clock at `start`.
    pub const fn at(start: Tick) -> Self {
        Self { now: start }
    }

    /// Move forward by `millis` milliseconds.
    pub const fn advance_millis(&mut self, millis: u64) -> Tick {
        self.now = self.now.plus_millis(millis);
        self.now
    }

    /// Move forward by `secs` seconds.
    pub const fn advance_secs(&mut self, secs: u64) -> Tick {
        self.now = self.now.plus_secs(secs);
        self.now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let mut clock = ManualClock::at(Tick::from_secs(1));
        assert_eq!(clock.now(), Tick::from_millis(1000));
        clock.advance_secs(900);
        assert_eq!(clock.now().secs_since(Tick::from_secs(1)), 900);
        clock.advance_millis(250);
        assert_eq!(clock.now().as_millis(), 901_250);
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::start();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
