//! PWM pulse-width receiver
//!
//! Measures the high time of PWM signals on up to 32 channels. Capture runs
//! in the pin-change interrupt; consumption runs in the application's
//! cooperative loop.
//!
//! ```text
//!  edge IRQ ──► PwmCapture::on_edge ──► ChangeLatch (slot + dirty bit)
//!                                              │
//!  main loop ──► PwmReceiver::poll_changes ◄───┘ snapshot_and_clear
//!                     │
//!                     └─► per dirty channel, ascending:
//!                         filter ─► transform ─► callback
//! ```
//!
//! Only the latest completed pulse of a channel survives between two polls.
//! Poll faster than the shortest expected pulse period or pulses are lost.
//!
//! # Example
//!
//! ```ignore
//! static CAPTURE: PwmCapture<EmbassyTime, 16> = PwmCapture::new(EmbassyTime);
//!
//! let steering = |us: u64| set_steering(us);
//! let in_range = |us: u64| (900..=2100).contains(&us);
//!
//! let mut receiver = PwmReceiver::<_, _>::new(&CAPTURE, board_edges);
//! receiver.attach_filtered(ChannelId::new(3), &steering, &in_range)?;
//!
//! loop {
//!     receiver.poll_changes();
//!     // ... other cooperative work ...
//! }
//! ```

pub mod capture;
pub mod error;
pub mod latch;
pub mod pipeline;

pub use crate::platform::traits::ChannelId;
pub use capture::PwmCapture;
pub use error::ReceiverError;
pub use latch::{ChangeLatch, ChannelMask, Snapshot, MAX_CHANNELS};
pub use pipeline::{
    accept_all, identity, reject_all, Filter, OnChange, PipelineEntry, PipelineRegistry,
    Transform,
};

use crate::core::traits::TimeSource;
use crate::platform::traits::EdgeNotifier;
use crate::{log_debug, log_trace, log_warn};

/// Pulse width in microseconds
pub type PulseDuration = u64;

/// Channel count of a 16-input receiver board
pub const DEFAULT_CHANNELS: usize = 16;

/// Polling-side owner of the channel pipelines
///
/// Holds the shared capture by reference (it normally lives in a `static`
/// that the interrupt handler also sees), the edge-interrupt routing service,
/// and the per-channel pipelines. Every method runs in the polling context.
///
/// `T` is the value type delivered to callbacks; the identity transform
/// produces it with `T::from(duration)`.
pub struct PwmReceiver<'a, C, E, T = PulseDuration, const N: usize = DEFAULT_CHANNELS> {
    capture: &'a PwmCapture<C, N>,
    edges: E,
    registry: PipelineRegistry<'a, T, N>,
}

impl<'a, C, E, T, const N: usize> PwmReceiver<'a, C, E, T, N>
where
    C: TimeSource,
    E: EdgeNotifier,
    T: From<PulseDuration>,
{
    /// Create a receiver with every channel detached
    pub fn new(capture: &'a PwmCapture<C, N>, edges: E) -> Self {
        Self {
            capture,
            edges,
            registry: PipelineRegistry::new(),
        }
    }

    /// Attach `on_change` to `channel` with accept-all filter and identity
    /// transform
    ///
    /// # Errors
    ///
    /// See [`attach_pipeline`](Self::attach_pipeline).
    pub fn attach(
        &mut self,
        channel: ChannelId,
        on_change: &'a dyn Fn(T),
    ) -> Result<(), ReceiverError> {
        self.attach_pipeline(channel, PipelineEntry::new(on_change))
    }

    /// Attach with a filter and identity transform
    ///
    /// # Errors
    ///
    /// See [`attach_pipeline`](Self::attach_pipeline).
    pub fn attach_filtered(
        &mut self,
        channel: ChannelId,
        on_change: &'a dyn Fn(T),
        filter: &'a dyn Fn(PulseDuration) -> bool,
    ) -> Result<(), ReceiverError> {
        self.attach_pipeline(channel, PipelineEntry::new(on_change).with_filter(filter))
    }

    /// Attach with a filter and a transform
    ///
    /// Pass [`accept_all`] as the filter to transform every duration.
    ///
    /// # Errors
    ///
    /// See [`attach_pipeline`](Self::attach_pipeline).
    pub fn attach_with(
        &mut self,
        channel: ChannelId,
        on_change: &'a dyn Fn(T),
        filter: &'a dyn Fn(PulseDuration) -> bool,
        transform: &'a dyn Fn(PulseDuration) -> T,
    ) -> Result<(), ReceiverError> {
        self.attach_pipeline(
            channel,
            PipelineEntry::new(on_change)
                .with_filter(filter)
                .with_transform(transform),
        )
    }

    /// Enable edge interrupts for `channel` and install `entry`
    ///
    /// Re-attaching an attached channel replaces its pipeline.
    ///
    /// # Errors
    ///
    /// - `ReceiverError::InvalidChannel` if `channel >= N`
    /// - `ReceiverError::Platform` if edge interrupts cannot be enabled; the
    ///   previous pipeline is kept
    pub fn attach_pipeline(
        &mut self,
        channel: ChannelId,
        entry: PipelineEntry<'a, T>,
    ) -> Result<(), ReceiverError> {
        if let Err(e) = self.registry.check(channel) {
            log_warn!("attach rejected: {}", e);
            return Err(e);
        }
        if let Err(e) = self.edges.enable_edges(channel) {
            log_warn!("attach {}: enabling edges failed: {}", channel, e);
            return Err(e.into());
        }
        if self.registry.install(channel, entry)? {
            log_debug!("re-attached {}", channel);
        } else {
            log_debug!("attached {}", channel);
        }
        Ok(())
    }

    /// Disable edge interrupts for `channel` and restore its detached
    /// defaults (reject-all filter, identity, no-op callback)
    ///
    /// A pulse completed before the call may still be pending; it is drained
    /// by the next poll through the detached pipeline and delivers nothing.
    ///
    /// # Errors
    ///
    /// - `ReceiverError::InvalidChannel` if `channel >= N`
    /// - `ReceiverError::Platform` if edge interrupts cannot be disabled; the
    ///   pipeline is reset regardless
    pub fn detach(&mut self, channel: ChannelId) -> Result<(), ReceiverError> {
        if let Err(e) = self.registry.check(channel) {
            log_warn!("detach rejected: {}", e);
            return Err(e);
        }
        let disabled = self.edges.disable_edges(channel);
        self.registry.reset(channel)?;
        match disabled {
            Ok(()) => {
                log_debug!("detached {}", channel);
                Ok(())
            }
            Err(e) => {
                log_warn!("detach {}: disabling edges failed: {}", channel, e);
                Err(e.into())
            }
        }
    }

    /// Dispatch every channel that completed a pulse since the last poll
    ///
    /// Call once per iteration of the main loop. Returns the number of
    /// callbacks invoked.
    ///
    /// When no channel is pending this returns without entering a critical
    /// section. Otherwise the latch is snapshotted and cleared, then each
    /// dirty channel runs its pipeline in ascending channel order, at most
    /// once per poll.
    ///
    /// # Panics
    ///
    /// Panics from user closures propagate. Channels after the panicking one
    /// are not dispatched and are not marked dirty again.
    pub fn poll_changes(&mut self) -> usize {
        let latch = self.capture.latch();
        if !latch.has_pending() {
            return 0;
        }

        let snapshot = latch.snapshot_and_clear();
        let mut delivered = 0;
        for (channel, duration) in snapshot.iter() {
            if let Some(entry) = self.registry.get(channel) {
                if entry.run(duration) {
                    delivered += 1;
                }
            }
        }

        log_trace!(
            "dispatched {} of {} pending channels",
            delivered,
            snapshot.dirty().len()
        );
        delivered
    }

    /// Whether `channel` has a user pipeline
    pub fn is_attached(&self, channel: ChannelId) -> bool {
        self.registry.is_attached(channel)
    }

    /// Channels with a user pipeline
    pub fn attached(&self) -> ChannelMask {
        self.registry.attached()
    }
}

impl<C, E, T, const N: usize> core::fmt::Debug for PwmReceiver<'_, C, E, T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PwmReceiver")
            .field("capture", &self.capture)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MockTime;
    use crate::platform::mock::MockEdgeController;
    use crate::platform::traits::EdgeHandler;
    use crate::platform::{GpioError, Level, PlatformError};
    use core::cell::{Cell, RefCell};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    type TestCapture = PwmCapture<MockTime, 8>;

    fn ch(id: u8) -> ChannelId {
        ChannelId::new(id)
    }

    fn setup() -> (TestCapture, MockEdgeController) {
        (PwmCapture::new(MockTime::new()), MockEdgeController::new())
    }

    #[test]
    fn default_channels_never_call_back() {
        let (capture, edges) = setup();
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);

        // Edges delivered straight to the capture, bypassing the controller
        for id in 0..8 {
            capture.clock().set(0);
            capture.on_edge(ch(id), Level::High);
            capture.clock().set(1_500);
            capture.on_edge(ch(id), Level::Low);
        }

        assert!(capture.latch().has_pending());
        assert_eq!(receiver.poll_changes(), 0);
        assert!(!capture.latch().has_pending());
    }

    #[test]
    fn attach_enables_edges_and_delivers_exact_duration() {
        let (capture, edges) = setup();
        let seen = Cell::new(None);
        let store = |v: u64| seen.set(Some(v));
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);

        receiver.attach(ch(1), &store).unwrap();
        assert!(edges.is_enabled(ch(1)));
        assert!(receiver.is_attached(ch(1)));

        assert!(edges.pulse(&capture, capture.clock(), ch(1), 10_000, 1_517));
        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(seen.get(), Some(1_517));
    }

    #[test]
    fn poll_without_pending_is_noop() {
        let (capture, edges) = setup();
        let hits = Cell::new(0);
        let count = |_: u64| hits.set(hits.get() + 1);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(0), &count).unwrap();

        assert_eq!(receiver.poll_changes(), 0);
        edges.pulse(&capture, capture.clock(), ch(0), 0, 1_000);
        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(receiver.poll_changes(), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn latest_pulse_wins() {
        let (capture, edges) = setup();
        let seen = RefCell::new(Vec::new());
        let store = |v: u64| seen.borrow_mut().push(v);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(2), &store).unwrap();

        edges.pulse(&capture, capture.clock(), ch(2), 0, 1_100);
        edges.pulse(&capture, capture.clock(), ch(2), 20_000, 1_900);

        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(*seen.borrow(), vec![1_900]);
    }

    #[test]
    fn channels_are_isolated() {
        let (capture, edges) = setup();
        let a = Cell::new(None);
        let b = Cell::new(None);
        let store_a = |v: u64| a.set(Some(v));
        let store_b = |v: u64| b.set(Some(v));
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(0), &store_a).unwrap();
        receiver.attach(ch(1), &store_b).unwrap();

        edges.pulse(&capture, capture.clock(), ch(0), 0, 1_200);
        assert!(!capture.latch().pending().contains(ch(1)));

        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(a.get(), Some(1_200));
        assert_eq!(b.get(), None);
    }

    #[test]
    fn dispatch_order_is_ascending() {
        let (capture, edges) = setup();
        let order = RefCell::new(Vec::new());
        let on_5 = |_: u64| order.borrow_mut().push(5);
        let on_0 = |_: u64| order.borrow_mut().push(0);
        let on_3 = |_: u64| order.borrow_mut().push(3);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(5), &on_5).unwrap();
        receiver.attach(ch(0), &on_0).unwrap();
        receiver.attach(ch(3), &on_3).unwrap();

        let attached: Vec<u8> = receiver.attached().iter().map(ChannelId::id).collect();
        assert_eq!(attached, vec![0, 3, 5]);

        edges.pulse(&capture, capture.clock(), ch(5), 0, 1_000);
        edges.pulse(&capture, capture.clock(), ch(3), 5_000, 1_000);
        edges.pulse(&capture, capture.clock(), ch(0), 9_000, 1_000);

        assert_eq!(receiver.poll_changes(), 3);
        assert_eq!(*order.borrow(), vec![0, 3, 5]);
    }

    #[test]
    fn filter_and_transform_apply() {
        let (capture, edges) = setup();
        let seen = Cell::new(None);
        let store = |v: u64| seen.set(Some(v));
        let valid = |us: u64| (900..=2_100).contains(&us);
        let to_ms = |us: u64| us / 1_000;
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach_with(ch(4), &store, &valid, &to_ms).unwrap();

        edges.pulse(&capture, capture.clock(), ch(4), 0, 5_000);
        assert_eq!(receiver.poll_changes(), 0);
        assert_eq!(seen.get(), None);

        edges.pulse(&capture, capture.clock(), ch(4), 20_000, 2_000);
        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(seen.get(), Some(2));
    }

    #[test]
    fn custom_value_type() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Micros(u64);

        impl From<u64> for Micros {
            fn from(us: u64) -> Self {
                Micros(us)
            }
        }

        let (capture, edges) = setup();
        let seen = Cell::new(None);
        let store = |v: Micros| seen.set(Some(v));
        let mut receiver = PwmReceiver::<_, _, Micros, 8>::new(&capture, &edges);
        receiver.attach(ch(0), &store).unwrap();

        edges.pulse(&capture, capture.clock(), ch(0), 0, 1_500);
        receiver.poll_changes();
        assert_eq!(seen.get(), Some(Micros(1_500)));
    }

    #[test]
    fn reattach_replaces_pipeline() {
        let (capture, edges) = setup();
        let first = Cell::new(0);
        let second = Cell::new(0);
        let count_first = |_: u64| first.set(first.get() + 1);
        let count_second = |_: u64| second.set(second.get() + 1);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);

        receiver.attach(ch(6), &count_first).unwrap();
        receiver.attach(ch(6), &count_second).unwrap();

        edges.pulse(&capture, capture.clock(), ch(6), 0, 1_000);
        receiver.poll_changes();
        assert_eq!((first.get(), second.get()), (0, 1));
    }

    #[test]
    fn detach_stops_delivery_and_allows_reattach() {
        let (capture, edges) = setup();
        let hits = Cell::new(0);
        let count = |_: u64| hits.set(hits.get() + 1);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);

        receiver.attach(ch(3), &count).unwrap();
        receiver.detach(ch(3)).unwrap();
        assert!(!edges.is_enabled(ch(3)));
        assert!(!receiver.is_attached(ch(3)));

        assert!(!edges.pulse(&capture, capture.clock(), ch(3), 0, 1_000));
        assert_eq!(receiver.poll_changes(), 0);

        receiver.attach(ch(3), &count).unwrap();
        edges.pulse(&capture, capture.clock(), ch(3), 10_000, 1_000);
        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn stale_pulse_after_detach_runs_default_pipeline() {
        let (capture, edges) = setup();
        let hits = Cell::new(0);
        let count = |_: u64| hits.set(hits.get() + 1);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(2), &count).unwrap();

        // Pulse completes, then the channel is detached before the poll
        edges.pulse(&capture, capture.clock(), ch(2), 0, 1_000);
        receiver.detach(ch(2)).unwrap();

        assert!(capture.latch().has_pending());
        assert_eq!(receiver.poll_changes(), 0);
        assert_eq!(hits.get(), 0);
        assert!(!capture.latch().has_pending());
    }

    #[test]
    fn invalid_channel_is_reported() {
        let (capture, edges) = setup();
        let noop = |_: u64| {};
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);

        let expected = ReceiverError::InvalidChannel {
            channel: ch(8),
            count: 8,
        };
        assert_eq!(receiver.attach(ch(8), &noop), Err(expected));
        assert_eq!(receiver.detach(ch(8)), Err(expected));
        assert!(!edges.is_enabled(ch(8)));
    }

    #[test]
    fn enable_failure_keeps_previous_pipeline() {
        let (capture, edges) = setup();
        let hits = Cell::new(0);
        let count = |_: u64| hits.set(hits.get() + 1);
        let noop = |_: u64| {};
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(1), &count).unwrap();

        edges.fail_channel(ch(1));
        assert_eq!(
            receiver.attach(ch(1), &noop),
            Err(ReceiverError::Platform(PlatformError::Gpio(
                GpioError::InterruptUnavailable
            )))
        );

        edges.pulse(&capture, capture.clock(), ch(1), 0, 1_000);
        assert_eq!(receiver.poll_changes(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn enable_failure_on_fresh_channel_leaves_it_detached() {
        let (capture, edges) = setup();
        let noop = |_: u64| {};
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);

        edges.fail_channel(ch(7));
        assert!(receiver.attach(ch(7), &noop).is_err());
        assert!(!receiver.is_attached(ch(7)));
    }

    #[test]
    fn disable_failure_still_resets_pipeline() {
        let (capture, edges) = setup();
        let hits = Cell::new(0);
        let count = |_: u64| hits.set(hits.get() + 1);
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(4), &count).unwrap();

        edges.fail_channel(ch(4));
        assert!(matches!(
            receiver.detach(ch(4)),
            Err(ReceiverError::Platform(_))
        ));
        assert!(!receiver.is_attached(ch(4)));

        // Routing is still live on the mock, but the pipeline rejects
        edges.pulse(&capture, capture.clock(), ch(4), 0, 1_000);
        assert_eq!(receiver.poll_changes(), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn panicking_callback_drops_rest_of_cycle() {
        let (capture, edges) = setup();
        let seen = RefCell::new(Vec::new());
        let store_0 = |v: u64| seen.borrow_mut().push((0, v));
        let boom = |_: u64| panic!("callback fault");
        let store_2 = |v: u64| seen.borrow_mut().push((2, v));
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(0), &store_0).unwrap();
        receiver.attach(ch(1), &boom).unwrap();
        receiver.attach(ch(2), &store_2).unwrap();

        for id in 0..3 {
            edges.pulse(&capture, capture.clock(), ch(id), u64::from(id) * 10_000, 1_000);
        }

        let result = catch_unwind(AssertUnwindSafe(|| receiver.poll_changes()));
        assert!(result.is_err());
        assert_eq!(*seen.borrow(), vec![(0, 1_000)]);

        // Channel 2 is not re-marked dirty
        assert!(!capture.latch().has_pending());
        assert_eq!(receiver.poll_changes(), 0);
    }

    #[test]
    fn wraparound_duration_is_delivered_unchanged() {
        let (capture, edges) = setup();
        let seen = Cell::new(None);
        let store = |v: u64| seen.set(Some(v));
        let mut receiver = PwmReceiver::<_, _, u64, 8>::new(&capture, &edges);
        receiver.attach(ch(0), &store).unwrap();

        capture.clock().set(10_000);
        edges.fire(&capture, ch(0), Level::High);
        capture.clock().set(9_000);
        edges.fire(&capture, ch(0), Level::Low);

        receiver.poll_changes();
        assert_eq!(seen.get(), Some(u64::MAX - 999));
    }
}
