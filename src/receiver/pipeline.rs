//! Per-channel filter → transform → callback configuration
//!
//! Each channel owns a [`PipelineEntry`]. The slots hold borrowed closures;
//! the unit variants ([`Filter::AcceptAll`], [`Filter::RejectAll`],
//! [`Transform::Identity`], [`OnChange::Ignore`]) are the built-in defaults
//! and need no storage.
//!
//! The registry is only touched from the polling context (attach, detach and
//! dispatch), so it needs no synchronization.

use core::fmt;

use super::error::ReceiverError;
use super::latch::ChannelMask;
use super::{ChannelId, PulseDuration};

/// Filter that accepts every duration
pub fn accept_all(_duration: PulseDuration) -> bool {
    true
}

/// Filter that rejects every duration
pub fn reject_all(_duration: PulseDuration) -> bool {
    false
}

/// Transform that passes the duration through unchanged
pub fn identity<T: From<PulseDuration>>(duration: PulseDuration) -> T {
    T::from(duration)
}

/// Predicate deciding whether a duration is dispatched
#[derive(Clone, Copy)]
pub enum Filter<'a> {
    /// Dispatch every duration (default for attach)
    AcceptAll,
    /// Dispatch nothing (default after detach)
    RejectAll,
    /// User predicate
    With(&'a dyn Fn(PulseDuration) -> bool),
}

impl Filter<'_> {
    /// Evaluate the filter
    pub fn accepts(&self, duration: PulseDuration) -> bool {
        match self {
            Filter::AcceptAll => accept_all(duration),
            Filter::RejectAll => reject_all(duration),
            Filter::With(f) => f(duration),
        }
    }
}

impl fmt::Debug for Filter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::AcceptAll => f.write_str("AcceptAll"),
            Filter::RejectAll => f.write_str("RejectAll"),
            Filter::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Conversion from a raw duration to the callback's value type
pub enum Transform<'a, T> {
    /// `T::from(duration)`
    Identity,
    /// User conversion
    With(&'a dyn Fn(PulseDuration) -> T),
}

impl<T: From<PulseDuration>> Transform<'_, T> {
    /// Apply the transform
    pub fn apply(&self, duration: PulseDuration) -> T {
        match self {
            Transform::Identity => identity(duration),
            Transform::With(f) => f(duration),
        }
    }
}

impl<T> Clone for Transform<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Transform<'_, T> {}

impl<T> fmt::Debug for Transform<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("Identity"),
            Transform::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Completion callback receiving the transformed value
pub enum OnChange<'a, T> {
    /// Discard the value (default after detach)
    Ignore,
    /// User callback
    Call(&'a dyn Fn(T)),
}

impl<T> OnChange<'_, T> {
    /// Deliver `value`; returns whether a user callback ran
    pub fn call(&self, value: T) -> bool {
        match self {
            OnChange::Ignore => false,
            OnChange::Call(f) => {
                f(value);
                true
            }
        }
    }
}

impl<T> Clone for OnChange<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for OnChange<'_, T> {}

impl<T> fmt::Debug for OnChange<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnChange::Ignore => f.write_str("Ignore"),
            OnChange::Call(_) => f.write_str("Call(..)"),
        }
    }
}

/// Filter, transform and callback of one channel
pub struct PipelineEntry<'a, T> {
    /// Evaluated first; `false` ends the pipeline
    pub filter: Filter<'a>,
    /// Evaluated only for accepted durations
    pub transform: Transform<'a, T>,
    /// Receives the transformed value
    pub on_change: OnChange<'a, T>,
}

impl<'a, T> PipelineEntry<'a, T> {
    /// Entry of a detached channel: reject-all, identity, no-op
    pub const fn detached() -> Self {
        Self {
            filter: Filter::RejectAll,
            transform: Transform::Identity,
            on_change: OnChange::Ignore,
        }
    }

    /// Entry with accept-all filter and identity transform
    pub fn new(on_change: &'a dyn Fn(T)) -> Self {
        Self {
            filter: Filter::AcceptAll,
            transform: Transform::Identity,
            on_change: OnChange::Call(on_change),
        }
    }

    /// Replace the filter
    pub fn with_filter(mut self, filter: &'a dyn Fn(PulseDuration) -> bool) -> Self {
        self.filter = Filter::With(filter);
        self
    }

    /// Replace the transform
    pub fn with_transform(mut self, transform: &'a dyn Fn(PulseDuration) -> T) -> Self {
        self.transform = Transform::With(transform);
        self
    }
}

impl<T: From<PulseDuration>> PipelineEntry<'_, T> {
    /// Run filter, then transform, then callback
    ///
    /// Returns whether a user callback was invoked. Panics from the user
    /// closures propagate.
    pub fn run(&self, duration: PulseDuration) -> bool {
        if !self.filter.accepts(duration) {
            return false;
        }
        let value = self.transform.apply(duration);
        self.on_change.call(value)
    }
}

impl<T> Clone for PipelineEntry<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PipelineEntry<'_, T> {}

impl<T> fmt::Debug for PipelineEntry<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEntry")
            .field("filter", &self.filter)
            .field("transform", &self.transform)
            .field("on_change", &self.on_change)
            .finish()
    }
}

/// Pipelines for channels `0..N`
pub struct PipelineRegistry<'a, T, const N: usize> {
    entries: [PipelineEntry<'a, T>; N],
    attached: ChannelMask,
}

impl<'a, T, const N: usize> PipelineRegistry<'a, T, N> {
    /// Registry with every channel detached
    pub const fn new() -> Self {
        Self {
            entries: [PipelineEntry::detached(); N],
            attached: ChannelMask::EMPTY,
        }
    }

    /// Validate that `channel` is within `0..N`
    pub fn check(&self, channel: ChannelId) -> Result<usize, ReceiverError> {
        let index = channel.index();
        if index < N {
            Ok(index)
        } else {
            Err(ReceiverError::InvalidChannel { channel, count: N })
        }
    }

    /// Install `entry` for `channel`, replacing any previous one
    ///
    /// Returns whether the channel was already attached.
    pub fn install(
        &mut self,
        channel: ChannelId,
        entry: PipelineEntry<'a, T>,
    ) -> Result<bool, ReceiverError> {
        let index = self.check(channel)?;
        let was_attached = self.attached.contains(channel);
        self.entries[index] = entry;
        self.attached.insert(channel);
        Ok(was_attached)
    }

    /// Restore the detached defaults for `channel`
    pub fn reset(&mut self, channel: ChannelId) -> Result<(), ReceiverError> {
        let index = self.check(channel)?;
        self.entries[index] = PipelineEntry::detached();
        self.attached.remove(channel);
        Ok(())
    }

    /// Pipeline of `channel`, `None` if out of range
    pub fn get(&self, channel: ChannelId) -> Option<&PipelineEntry<'a, T>> {
        self.entries.get(channel.index())
    }

    /// Whether `channel` currently has a user pipeline
    pub fn is_attached(&self, channel: ChannelId) -> bool {
        self.attached.contains(channel)
    }

    /// Channels with a user pipeline
    pub fn attached(&self) -> ChannelMask {
        self.attached
    }
}

impl<T, const N: usize> Default for PipelineRegistry<'_, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for PipelineRegistry<'_, T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("attached", &self.attached)
            .finish_non_exhaustive()
    }
}
