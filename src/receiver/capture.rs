//! Interrupt-side pulse width capture
//!
//! [`PwmCapture`] turns raw edge notifications into pulse durations. Place it
//! in a `static` and call [`EdgeHandler::on_edge`] from the platform's
//! pin-change interrupt handler:
//!
//! ```ignore
//! static CAPTURE: PwmCapture<EmbassyTime, 16> = PwmCapture::new(EmbassyTime);
//!
//! #[interrupt]
//! fn IO_IRQ_BANK0() {
//!     // ... find the interrupting pin and its new level ...
//!     CAPTURE.on_edge(ChannelId::new(pin), Level::from(is_high));
//! }
//! ```
//!
//! # Clock Wraparound
//!
//! The duration is `falling - rising` with wrapping subtraction. If the clock
//! wraps (or steps backwards) inside a pulse the recorded duration is a very
//! large value. This is passed through unchanged; filter it out in the
//! channel's pipeline if it matters.

use core::cell::Cell;

use critical_section::Mutex;

use super::latch::ChangeLatch;
use crate::core::traits::TimeSource;
use crate::platform::traits::{ChannelId, EdgeHandler, Level};

/// Edge-to-duration converter feeding a [`ChangeLatch`]
pub struct PwmCapture<C, const N: usize> {
    clock: C,
    /// Latest rising-edge timestamp per channel, `None` until the first one
    wave_starts: Mutex<[Cell<Option<u64>>; N]>,
    latch: ChangeLatch<N>,
}

impl<C, const N: usize> PwmCapture<C, N> {
    /// Create a capture reading timestamps from `clock`
    pub const fn new(clock: C) -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const NO_PULSE: Cell<Option<u64>> = Cell::new(None);
        Self {
            clock,
            wave_starts: Mutex::new([NO_PULSE; N]),
            latch: ChangeLatch::new(),
        }
    }

    /// Latch receiving completed pulses
    pub fn latch(&self) -> &ChangeLatch<N> {
        &self.latch
    }

    /// Clock used for timestamps
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of channels this capture tracks
    pub const fn channel_count(&self) -> usize {
        N
    }
}

impl<C: TimeSource, const N: usize> EdgeHandler for PwmCapture<C, N> {
    /// Rising edge: remember the timestamp, replacing any open pulse.
    /// Falling edge: record the elapsed time and mark the channel dirty.
    ///
    /// The rising-edge timestamp is kept, so a repeated falling edge is
    /// measured from the latest rising edge. A falling edge on a channel that
    /// has never seen a rising edge (capture enabled mid-pulse) and any
    /// channel outside `0..N` are ignored.
    fn on_edge(&self, channel: ChannelId, level: Level) {
        let index = channel.index();
        if index >= N {
            return;
        }
        let now = self.clock.now_us();

        match level {
            Level::High => {
                critical_section::with(|cs| self.wave_starts.borrow(cs)[index].set(Some(now)));
            }
            Level::Low => {
                let start = critical_section::with(|cs| self.wave_starts.borrow(cs)[index].get());
                if let Some(start) = start {
                    self.latch.record(channel, now.wrapping_sub(start));
                }
            }
        }
    }
}

impl<C, const N: usize> core::fmt::Debug for PwmCapture<C, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PwmCapture")
            .field("latch", &self.latch)
            .finish_non_exhaustive()
    }
}
