//! Clock readings used by timers and stage timings.

use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static MONOTONIC_BASE: LazyLock<Instant> = LazyLock::new(Instant::now);

/// A cheap monotonic reading in nanoseconds since process start.
///
/// The base instant is captured on first use; registry construction touches
/// it so hot-path readings never pay the initialization.
#[inline]
pub fn cheap_now_nanos() -> i64 {
    MONOTONIC_BASE.elapsed().as_nanos() as i64
}

/// A wall-clock timestamp split into whole seconds since the epoch and the
/// nanosecond remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WallTime {
    pub seconds: i64,
    pub nanos: i32,
}

/// The current wall-clock time. Used for stage timestamps only; samples use
/// [`cheap_now_nanos`].
pub fn wall_now() -> WallTime {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("duration since epoch must not be invalid");
    WallTime {
        seconds: now.as_secs() as i64,
        nanos: now.subsec_nanos() as i32,
    }
}
