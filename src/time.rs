//! Monotonic time base used for record timestamps

use std::{sync::OnceLock, time::Instant};

/// Absolute time in microseconds
pub type OrbAbstime = u64;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current value of the monotonic clock in microseconds.
///
/// Starts counting at the first call in the process and never returns 0, so
/// a zero timestamp can keep meaning "never".
pub fn absolute_time() -> OrbAbstime {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as OrbAbstime + 1
}

/// Time elapsed since `then`
pub fn elapsed_time(then: OrbAbstime) -> OrbAbstime {
    absolute_time().saturating_sub(then)
}

/// Convert a frequency in Hz to an interval in microseconds (0 stays 0)
pub fn frequency_to_interval(frequency: u32) -> u32 {
    if frequency == 0 {
        0
    } else {
        1_000_000 / frequency
    }
}

/// Convert an interval in microseconds to a frequency in Hz (0 stays 0)
pub fn interval_to_frequency(interval: u32) -> u32 {
    if interval == 0 {
        0
    } else {
        1_000_000 / interval
    }
}
