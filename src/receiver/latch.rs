//! Interrupt-to-poll handoff of completed pulse durations
//!
//! [`ChangeLatch`] holds one duration slot and one dirty bit per channel. The
//! edge capture writes it from interrupt context; the dispatcher drains it
//! from the polling loop with [`ChangeLatch::snapshot_and_clear`].
//!
//! # Concurrency
//!
//! The dirty register and the value array live together behind a single
//! `critical_section::Mutex`. A critical section is the platform's "run this
//! block with interrupts suspended" primitive, not a general lock: on a single
//! core it masks interrupts instead of waiting, so an interrupt can never
//! block on the polling context. Both writers and the snapshot hold it only
//! for a handful of word copies, never across user callbacks.
//!
//! Do not replace it with a spin or blocking mutex. An interrupt that fires
//! while the polling context holds such a lock would wait forever.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use super::{ChannelId, PulseDuration};

/// Largest channel count a latch can track (width of the dirty register)
pub const MAX_CHANNELS: usize = 32;

/// Fixed-width channel bitset, bit `n` for channel `n`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask(u32);

impl ChannelMask {
    /// Mask with no channel set
    pub const EMPTY: Self = Self(0);

    /// Build a mask from raw register bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw register bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no channel is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels set
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether `channel` is set
    pub const fn contains(self, channel: ChannelId) -> bool {
        match 1u32.checked_shl(channel.id() as u32) {
            Some(bit) => self.0 & bit != 0,
            None => false,
        }
    }

    /// Set `channel`; ids past the register width are ignored
    pub fn insert(&mut self, channel: ChannelId) {
        if let Some(bit) = 1u32.checked_shl(u32::from(channel.id())) {
            self.0 |= bit;
        }
    }

    /// Clear `channel`
    pub fn remove(&mut self, channel: ChannelId) {
        if let Some(bit) = 1u32.checked_shl(u32::from(channel.id())) {
            self.0 &= !bit;
        }
    }

    /// Iterate set channels in ascending index order
    pub const fn iter(self) -> MaskChannels {
        MaskChannels(self.0)
    }
}

impl IntoIterator for ChannelMask {
    type Item = ChannelId;
    type IntoIter = MaskChannels;

    fn into_iter(self) -> MaskChannels {
        self.iter()
    }
}

/// Ascending iterator over the channels of a [`ChannelMask`]
#[derive(Debug, Clone)]
pub struct MaskChannels(u32);

impl Iterator for MaskChannels {
    type Item = ChannelId;

    fn next(&mut self) -> Option<ChannelId> {
        if self.0 == 0 {
            return None;
        }
        let lowest = self.0.trailing_zeros();
        // Clear lowest set bit
        self.0 &= self.0 - 1;
        Some(ChannelId::new(lowest as u8))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for MaskChannels {}

/// Consistent copy of the latch taken by [`ChangeLatch::snapshot_and_clear`]
///
/// Values of channels that are not dirty are unspecified, so they are only
/// reachable through the mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<const N: usize> {
    dirty: ChannelMask,
    values: [PulseDuration; N],
}

impl<const N: usize> Snapshot<N> {
    /// Channels that completed a pulse since the previous snapshot
    pub fn dirty(&self) -> ChannelMask {
        self.dirty
    }

    /// Latest completed duration for `channel`, if it is dirty
    pub fn get(&self, channel: ChannelId) -> Option<PulseDuration> {
        if self.dirty.contains(channel) {
            self.values.get(channel.index()).copied()
        } else {
            None
        }
    }

    /// Dirty channels with their durations, ascending by channel
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, PulseDuration)> + '_ {
        self.dirty
            .iter()
            .filter_map(move |channel| Some((channel, *self.values.get(channel.index())?)))
    }
}

struct LatchState<const N: usize> {
    dirty: ChannelMask,
    values: [PulseDuration; N],
}

/// Shared storage between the edge capture and the dispatcher
///
/// `N` must be in `1..=32`; other values fail to compile when the latch is
/// constructed.
pub struct ChangeLatch<const N: usize> {
    state: Mutex<RefCell<LatchState<N>>>,
    /// Copy of the dirty register for the unsynchronized fast path
    pending: AtomicU32,
}

impl<const N: usize> ChangeLatch<N> {
    const CHANNEL_COUNT_OK: () = assert!(
        N > 0 && N <= MAX_CHANNELS,
        "channel count must be between 1 and 32"
    );

    /// Create an empty latch (const for static placement)
    pub const fn new() -> Self {
        let () = Self::CHANNEL_COUNT_OK;
        Self {
            state: Mutex::new(RefCell::new(LatchState {
                dirty: ChannelMask::EMPTY,
                values: [0; N],
            })),
            pending: AtomicU32::new(0),
        }
    }

    /// Store a completed pulse for `channel` and mark it dirty
    ///
    /// Called from interrupt context. The slot write and the dirty bit are set
    /// in one critical section, so a snapshot sees both or neither. Out of
    /// range channels are ignored.
    pub fn record(&self, channel: ChannelId, duration: PulseDuration) {
        let index = channel.index();
        if index >= N {
            return;
        }
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.values[index] = duration;
            state.dirty.insert(channel);
            self.pending.store(state.dirty.bits(), Ordering::Relaxed);
        });
    }

    /// Unsynchronized check for dirty channels
    ///
    /// Interrupts only ever add bits, so a stale read at worst delays work to
    /// the next poll.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Relaxed) != 0
    }

    /// Unsynchronized view of the dirty register
    pub fn pending(&self) -> ChannelMask {
        ChannelMask::from_bits(self.pending.load(Ordering::Relaxed))
    }

    /// Copy the dirty register and all values, then clear the register
    ///
    /// Runs entirely inside one critical section, so no capture can land
    /// between copying a value and clearing its flag. Captures that fire
    /// during the copy are held off and show up in the next snapshot.
    pub fn snapshot_and_clear(&self) -> Snapshot<N> {
        self.snapshot_and_clear_with(|_| {})
    }

    /// Snapshot with a hook invoked before each slot copy
    fn snapshot_and_clear_with(&self, mut before_slot: impl FnMut(usize)) -> Snapshot<N> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let dirty = core::mem::take(&mut state.dirty);
            let mut values = [0; N];
            for (index, (dst, src)) in values.iter_mut().zip(state.values.iter()).enumerate() {
                before_slot(index);
                *dst = *src;
            }
            self.pending.store(0, Ordering::Relaxed);
            Snapshot { dirty, values }
        })
    }
}

impl<const N: usize> Default for ChangeLatch<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for ChangeLatch<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeLatch")
            .field("channels", &N)
            .field("pending", &self.pending())
            .finish()
    }
}
