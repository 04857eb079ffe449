//! Tick clock.
//!
//! `lbolt` counts ticks of roughly 8.4 ms derived from the high-resolution
//! timer, giving [`HZ`] ticks per second.

use std::time::{Duration, Instant};

use kstub_diag::dprintf::hrtime;

/// Ticks per second of [`lbolt`].
pub const HZ: i64 = 119;

const NANOSEC: i64 = 1_000_000_000;

/// Ticks elapsed since the clock was first read.
pub fn lbolt() -> i64 {
    (hrtime() >> 23) as i64
}

/// Converts an absolute tick count to an `Instant`, or `None` if it has passed.
pub fn deadline_from_ticks(abstime: i64) -> Option<Instant> {
    let delta = abstime.saturating_sub(lbolt());
    if delta <= 0 {
        return None;
    }
    let secs = (delta / HZ) as u64;
    let nanos = ((delta % HZ) * (NANOSEC / HZ)) as u64;
    Some(Instant::now() + Duration::from_secs(secs) + Duration::from_nanos(nanos))
}

/// Sleeps for `ticks` clock ticks.
pub fn delay(ticks: i64) {
    if ticks > 0 {
        std::thread::sleep(Duration::from_millis((ticks * (1000 / HZ)) as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lbolt_is_monotonic() {
        let a = lbolt();
        delay(3);
        let b = lbolt();
        assert!(b >= a);
    }

    #[test]
    fn past_ticks_have_no_deadline() {
        assert_eq!(deadline_from_ticks(lbolt()), None);
        assert_eq!(deadline_from_ticks(i64::MIN), None);
    }

    #[test]
    fn future_ticks_map_to_future_instant() {
        let before = Instant::now();
        let deadline = deadline_from_ticks(lbolt() + HZ).unwrap();
        assert!(deadline > before);
        assert!(deadline <= Instant::now() + Duration::from_secs(2));
    }
}
