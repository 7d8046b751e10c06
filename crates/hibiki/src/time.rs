//! Scaled-time arithmetic.
//!
//! Manifests express segment timing as integers in a representation-local
//! unit (the timescale, units per second). Everything else in the player
//! works in wall-clock ticks. A [`Timescale`] converts between the two.

/// Wall-clock tick, in microseconds.
pub type Tick = i64;

/// Time value expressed in timescale units.
pub type ScaledTime = i64;

pub const TICKS_PER_SECOND: Tick = 1_000_000;

pub const fn ticks_from_seconds(secs: i64) -> Tick {
    secs * TICKS_PER_SECOND
}

pub fn ticks_from_seconds_f64(secs: f64) -> Tick {
    (secs * TICKS_PER_SECOND as f64) as Tick
}

/// Wall-clock now, as ticks since the Unix epoch. Manifest availability
/// times are expressed on the same axis.
pub fn now_ticks() -> Tick {
    chrono::Utc::now().timestamp_micros()
}

/// Units-per-second scale factor of a sample timeline.
///
/// A scale of zero marks an invalid/unset timescale; conversions through it
/// return zero and `is_valid` lets callers reject it up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timescale(u64);

impl Timescale {
    pub const fn new(scale: u64) -> Self {
        Timescale(scale)
    }

    pub const fn invalid() -> Self {
        Timescale(0)
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }

    pub fn scale(&self) -> u64 {
        self.0
    }

    /// Scaled time to wall-clock ticks.
    pub fn to_time(&self, scaled: ScaledTime) -> Tick {
        if self.0 == 0 {
            return 0;
        }
        let whole = scaled / self.0 as i64;
        let rem = scaled % self.0 as i64;
        whole * TICKS_PER_SECOND + rem * TICKS_PER_SECOND / self.0 as i64
    }

    /// Wall-clock ticks to scaled time.
    pub fn to_scaled(&self, time: Tick) -> ScaledTime {
        let whole = time / TICKS_PER_SECOND;
        let rem = time % TICKS_PER_SECOND;
        whole * self.0 as i64 + rem * self.0 as i64 / TICKS_PER_SECOND
    }
}

impl Default for Timescale {
    fn default() -> Self {
        Timescale(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_exact() {
        let ts = Timescale::new(90_000);
        for scaled in [0i64, 1, 90_000, 90_001, 123_456_789] {
            let time = ts.to_time(scaled);
            let back = ts.to_scaled(time);
            assert!(
                (back - scaled).abs() <= 1,
                "roundtrip of {scaled} gave {back}"
            );
        }
    }

    #[test]
    fn test_to_time_simple() {
        let ts = Timescale::new(1000);
        assert_eq!(ts.to_time(1000), TICKS_PER_SECOND);
        assert_eq!(ts.to_time(500), TICKS_PER_SECOND / 2);
        assert_eq!(ts.to_scaled(TICKS_PER_SECOND), 1000);
    }

    #[test]
    fn test_invalid_timescale() {
        let ts = Timescale::invalid();
        assert!(!ts.is_valid());
        assert_eq!(ts.to_time(1234), 0);
    }

    #[test]
    fn test_large_values_no_overflow() {
        // 10 hours at 10MHz timescale
        let ts = Timescale::new(10_000_000);
        let scaled = 10 * 3600 * 10_000_000i64;
        let time = ts.to_time(scaled);
        assert_eq!(time, ticks_from_seconds(10 * 3600));
        assert_eq!(ts.to_scaled(time), scaled);
    }
}
