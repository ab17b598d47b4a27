//! # Utility Functions
//!
//! Time sources and small helpers shared by the shard core.
//!
//! ## Key Items
//!
//! - [`Clock`] - Millisecond time source consumed by the tick loop and timers
//! - [`SystemClock`] - Monotonic clock backed by [`std::time::Instant`]
//! - [`ManualClock`] - Shared, explicitly advanced clock for deterministic tests
//! - [`current_timestamp()`] - Wall-clock seconds for log and snapshot stamps

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ============================================================================
// Clocks
// ============================================================================

/// A monotonic millisecond time source.
///
/// Every shard reads time exclusively through its clock, so the same tick
/// loop code runs against real time in production and against a
/// [`ManualClock`] in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now_millis(&self) -> u64;
}

/// Monotonic clock measuring from the moment it was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// shard and keep another to advance it.
///
/// ```rust
/// use realm_core::{Clock, ManualClock};
///
/// let clock = ManualClock::new(0);
/// let shared = clock.clone();
/// clock.advance(120);
/// assert_eq!(shared.now_millis(), 120);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::AcqRel);
    }

    /// Sets the absolute time. Setting it backwards is allowed; elapsed-time
    /// computations saturate at zero.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns the current Unix timestamp in seconds, or 0 if the system clock
/// reports a time before the epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extracts a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
