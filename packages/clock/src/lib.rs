//! The clock behind every peer timestamp.
//!
//! The tracker's whole notion of peer liveness is "when did I last hear
//! from this address", and `clean()` compares those stamps against a
//! staleness cutoff. Reading `SystemTime` at those call sites would make
//! the eviction logic untestable without real sleeps, so both sides of the
//! repo take their time from a [`Clock`] instead: [`SystemClock`] in
//! production, [`FrozenClock`] in tests, where eviction is exercised by
//! pinning the clock and jumping it past the update interval.
//!
//! A timestamp is a [`DurationSinceUnixEpoch`]; on disk and on the wire it
//! always narrows to whole Unix seconds (see [`conv`]).
use std::time::Duration;

use shoal_primitives::DurationSinceUnixEpoch;

pub mod conv;

/// A source of "now".
///
/// Implementations are unit types, so a caller picks its clock with a type
/// alias and reads it through associated functions; no clock value is
/// threaded through constructors.
pub trait Clock {
    /// The current instant.
    fn now() -> DurationSinceUnixEpoch;

    /// The instant `age` before now, saturating at the Unix epoch.
    ///
    /// This is the staleness cutoff shape: a peer stamped before
    /// `cutoff(PEER_UPDATE_INTERVAL)` has not been heard from within the
    /// interval.
    #[must_use]
    fn cutoff(age: Duration) -> DurationSinceUnixEpoch {
        Self::now().saturating_sub(age)
    }
}

/// The production clock: wall time from the operating system.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now() -> DurationSinceUnixEpoch {
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .expect("the system time is after the Unix epoch")
    }
}

/// A clock that only moves when told to.
///
/// Every thread gets its own frozen instant, starting at the Unix epoch, so
/// concurrently running tests cannot race each other's time. A test drives
/// it explicitly:
///
/// ```rust
/// use std::time::Duration;
/// use shoal_clock::{Clock, FrozenClock};
///
/// FrozenClock::set(Duration::from_secs(1_000));
/// FrozenClock::advance(Duration::from_secs(60));
///
/// assert_eq!(FrozenClock::now(), Duration::from_secs(1_060));
/// ```
pub struct FrozenClock;

thread_local! {
    static FROZEN_AT: std::cell::Cell<DurationSinceUnixEpoch> =
        const { std::cell::Cell::new(DurationSinceUnixEpoch::ZERO) };
}

impl FrozenClock {
    /// Pins this thread's clock to `instant`.
    pub fn set(instant: DurationSinceUnixEpoch) {
        FROZEN_AT.with(|frozen| frozen.set(instant));
    }

    /// Moves this thread's clock forward by `step`.
    pub fn advance(step: Duration) {
        FROZEN_AT.with(|frozen| frozen.set(frozen.get() + step));
    }
}

impl Clock for FrozenClock {
    fn now() -> DurationSinceUnixEpoch {
        FROZEN_AT.with(std::cell::Cell::get)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{Clock, FrozenClock, SystemClock};

    #[test]
    fn the_frozen_clock_should_start_at_the_unix_epoch() {
        assert_eq!(FrozenClock::now(), Duration::ZERO);
    }

    #[test]
    fn the_frozen_clock_should_only_move_when_told_to() {
        FrozenClock::set(Duration::from_secs(1_669_397_478));

        let before = FrozenClock::now();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(FrozenClock::now(), before);

        FrozenClock::advance(Duration::from_secs(60));
        assert_eq!(FrozenClock::now(), before + Duration::from_secs(60));
    }

    #[test]
    fn each_thread_should_get_its_own_frozen_instant() {
        FrozenClock::set(Duration::from_secs(500));

        std::thread::spawn(|| {
            assert_eq!(FrozenClock::now(), Duration::ZERO);
            FrozenClock::set(Duration::from_secs(9_999));
        })
        .join()
        .unwrap();

        assert_eq!(FrozenClock::now(), Duration::from_secs(500));
    }

    #[test]
    fn the_cutoff_should_trail_now_by_the_given_age() {
        FrozenClock::set(Duration::from_secs(2_000));

        assert_eq!(FrozenClock::cutoff(Duration::from_secs(900)), Duration::from_secs(1_100));
    }

    #[test]
    fn the_cutoff_should_saturate_at_the_unix_epoch() {
        FrozenClock::set(Duration::from_secs(10));

        assert_eq!(FrozenClock::cutoff(Duration::from_secs(900)), Duration::ZERO);
    }

    #[test]
    fn the_system_clock_should_run_on_wall_time() {
        // Well after this repo was written; a sane system clock is past it.
        let written = Duration::from_secs(1_700_000_000);

        assert!(SystemClock::now() > written);
        assert_ne!(SystemClock::now(), FrozenClock::now());
    }
}
