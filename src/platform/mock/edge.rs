//! Mock edge interrupt controller for testing

use core::sync::atomic::{AtomicU32, Ordering};

use crate::platform::{
    error::{GpioError, PlatformError},
    traits::{ChannelId, EdgeHandler, EdgeNotifier, Level},
    Result,
};

/// Mock pin-change interrupt controller
///
/// Tracks which channels have edge interrupts routed and only forwards
/// simulated edges for those channels, like real hardware. The notifier side
/// is implemented for `&MockEdgeController`, so a test can hand one reference
/// to the receiver and keep another to fire edges.
///
/// Supports up to 32 channels.
#[derive(Debug, Default)]
pub struct MockEdgeController {
    enabled: AtomicU32,
    failing: AtomicU32,
}

impl MockEdgeController {
    /// Create a controller with every channel disabled
    pub const fn new() -> Self {
        Self {
            enabled: AtomicU32::new(0),
            failing: AtomicU32::new(0),
        }
    }

    /// Whether edge interrupts are currently routed for `channel`
    pub fn is_enabled(&self, channel: ChannelId) -> bool {
        match bit(channel) {
            Some(bit) => self.enabled.load(Ordering::SeqCst) & bit != 0,
            None => false,
        }
    }

    /// Make enable/disable requests for `channel` fail with
    /// `GpioError::InterruptUnavailable`
    pub fn fail_channel(&self, channel: ChannelId) {
        if let Some(bit) = bit(channel) {
            self.failing.fetch_or(bit, Ordering::SeqCst);
        }
    }

    /// Simulate a pin-change interrupt
    ///
    /// Calls `handler.on_edge` only if `channel` is enabled. Returns whether
    /// the edge was delivered.
    pub fn fire<H: EdgeHandler + ?Sized>(
        &self,
        handler: &H,
        channel: ChannelId,
        level: Level,
    ) -> bool {
        if !self.is_enabled(channel) {
            return false;
        }
        handler.on_edge(channel, level);
        true
    }

    /// Simulate a complete pulse: rising edge at `start_us`, falling edge
    /// `width_us` later, advancing `clock` in between
    #[cfg(target_has_atomic = "64")]
    pub fn pulse<H: EdgeHandler + ?Sized>(
        &self,
        handler: &H,
        clock: &crate::core::traits::MockTime,
        channel: ChannelId,
        start_us: u64,
        width_us: u64,
    ) -> bool {
        clock.set(start_us);
        let rising = self.fire(handler, channel, Level::High);
        clock.advance(width_us);
        let falling = self.fire(handler, channel, Level::Low);
        rising && falling
    }

    fn check(&self, channel: ChannelId) -> Result<u32> {
        let bit = bit(channel).ok_or(PlatformError::Gpio(GpioError::InvalidPin))?;
        if self.failing.load(Ordering::SeqCst) & bit != 0 {
            return Err(PlatformError::Gpio(GpioError::InterruptUnavailable));
        }
        Ok(bit)
    }
}

impl EdgeNotifier for &MockEdgeController {
    fn enable_edges(&mut self, channel: ChannelId) -> Result<()> {
        let bit = self.check(channel)?;
        self.enabled.fetch_or(bit, Ordering::SeqCst);
        Ok(())
    }

    fn disable_edges(&mut self, channel: ChannelId) -> Result<()> {
        let bit = self.check(channel)?;
        self.enabled.fetch_and(!bit, Ordering::SeqCst);
        Ok(())
    }
}

fn bit(channel: ChannelId) -> Option<u32> {
    1u32.checked_shl(u32::from(channel.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Recorder {
        last: critical_section::Mutex<Cell<Option<(ChannelId, Level)>>>,
    }

    impl EdgeHandler for Recorder {
        fn on_edge(&self, channel: ChannelId, level: Level) {
            critical_section::with(|cs| self.last.borrow(cs).set(Some((channel, level))));
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            last: critical_section::Mutex::new(Cell::new(None)),
        }
    }

    #[test]
    fn test_enable_disable() {
        let controller = MockEdgeController::new();
        let ch = ChannelId::new(4);
        assert!(!controller.is_enabled(ch));

        (&controller).enable_edges(ch).unwrap();
        assert!(controller.is_enabled(ch));
        assert!(!controller.is_enabled(ChannelId::new(5)));

        (&controller).disable_edges(ch).unwrap();
        assert!(!controller.is_enabled(ch));
    }

    #[test]
    fn test_fire_only_when_enabled() {
        let controller = MockEdgeController::new();
        let handler = recorder();
        let ch = ChannelId::new(1);

        assert!(!controller.fire(&handler, ch, Level::High));
        assert_eq!(critical_section::with(|cs| handler.last.borrow(cs).get()), None);

        (&controller).enable_edges(ch).unwrap();
        assert!(controller.fire(&handler, ch, Level::High));
        assert_eq!(
            critical_section::with(|cs| handler.last.borrow(cs).get()),
            Some((ch, Level::High))
        );
    }

    #[test]
    fn test_failing_channel() {
        let controller = MockEdgeController::new();
        let ch = ChannelId::new(2);
        controller.fail_channel(ch);

        assert_eq!(
            (&controller).enable_edges(ch),
            Err(PlatformError::Gpio(GpioError::InterruptUnavailable))
        );
        assert!(!controller.is_enabled(ch));
    }

    #[test]
    fn test_channel_beyond_register_width() {
        let controller = MockEdgeController::new();
        assert_eq!(
            (&controller).enable_edges(ChannelId::new(40)),
            Err(PlatformError::Gpio(GpioError::InvalidPin))
        );
    }

    #[test]
    fn test_concurrent_enable_keeps_every_channel() {
        let controller = MockEdgeController::new();

        std::thread::scope(|s| {
            for id in 0..32u8 {
                let controller = &controller;
                s.spawn(move || {
                    for _ in 0..200 {
                        let mut notifier = controller;
                        notifier.enable_edges(ChannelId::new(id)).unwrap();
                        if id % 2 == 1 {
                            notifier.disable_edges(ChannelId::new(id)).unwrap();
                        }
                    }
                });
            }
        });

        for id in 0..32u8 {
            assert_eq!(controller.is_enabled(ChannelId::new(id)), id % 2 == 0, "ch{id}");
        }
    }
}
