//! Time abstraction traits for platform-agnostic timing operations.
//!
//! This module provides the `TimeSource` trait that abstracts over different
//! microsecond clocks (Embassy, mock, etc.) so pulse capture can be tested on
//! the host without embedded dependencies.

#[cfg(target_has_atomic = "64")]
use core::sync::atomic::{AtomicU64, Ordering};

/// Monotonic microsecond clock read by the edge capture.
///
/// This trait abstracts over different time providers:
/// - `EmbassyTime` for embedded targets using Embassy
/// - `MockTime` for host testing with controllable time
///
/// Implementations are read from interrupt context, so `now_us` must not
/// block.
///
/// # Example
///
/// ```
/// use pwm_receiver::core::traits::{MockTime, TimeSource};
///
/// let time = MockTime::new();
/// time.set(1_000);
/// let start = time.now_us();
/// time.advance(1_500);
/// assert_eq!(time.elapsed_since(start), 1_500);
/// ```
pub trait TimeSource: Send + Sync {
    /// Returns current time in microseconds since system start.
    fn now_us(&self) -> u64;

    /// Returns elapsed time in microseconds since a reference point.
    ///
    /// Uses wrapping subtraction: a clock that wrapped (or a reference from
    /// the future) yields a very large value rather than zero.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().wrapping_sub(reference_us)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

// ============================================================================
// Embassy Implementation
// ============================================================================

/// Embassy-based time source using the Embassy time driver.
///
/// This implementation uses `embassy_time::Instant` for high-resolution
/// timing on embedded targets with Embassy async runtime.
#[cfg(feature = "embassy")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyTime;

#[cfg(feature = "embassy")]
impl TimeSource for EmbassyTime {
    fn now_us(&self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}

// ============================================================================
// Mock Implementation (always available for testing)
// ============================================================================

/// Mock time source for testing with controllable time advancement.
///
/// Backed by an atomic so that simulated interrupts running on other host
/// threads observe the same clock as the test body. Only built on targets
/// with 64-bit atomics.
#[cfg(target_has_atomic = "64")]
#[derive(Debug, Default)]
pub struct MockTime {
    current_us: AtomicU64,
}

#[cfg(target_has_atomic = "64")]
impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub const fn new() -> Self {
        Self::with_initial(0)
    }

    /// Creates a new `MockTime` starting at the specified time.
    pub const fn with_initial(us: u64) -> Self {
        Self {
            current_us: AtomicU64::new(us),
        }
    }

    /// Sets the current time to an absolute value.
    pub fn set(&self, us: u64) {
        self.current_us.store(us, Ordering::SeqCst);
    }

    /// Advances the current time by the specified amount, wrapping on overflow.
    pub fn advance(&self, us: u64) {
        self.current_us.fetch_add(us, Ordering::SeqCst);
    }
}

#[cfg(target_has_atomic = "64")]
impl TimeSource for MockTime {
    fn now_us(&self) -> u64 {
        self.current_us.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
