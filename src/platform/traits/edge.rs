//! Edge interrupt interface traits
//!
//! This module defines the contract between the receiver core and the
//! platform's pin-change interrupt wiring:
//!
//! - [`EdgeNotifier`] is called from the polling context to route (or stop
//!   routing) pin-change interrupts for a channel.
//! - [`EdgeHandler`] is called by the platform's interrupt handler on every
//!   transition of a routed channel.

use core::fmt;

use crate::platform::Result;

/// Identifier of one monitored input line
///
/// A small integer in `[0, N)` where `N` is the receiver's channel count.
/// Mapping a channel to a physical pin is the platform's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(u8);

impl ChannelId {
    /// Create a channel identifier
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Raw channel number
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Channel number as an array index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for ChannelId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Logic level of an input line after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// High -> low transition (end of a pulse)
    Low,
    /// Low -> high transition (start of a pulse)
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Interrupt-side receiver of edge events
///
/// The platform's pin-change interrupt handler calls `on_edge` once per
/// transition on a routed channel, tagged with the level the line changed to.
///
/// # Interrupt Context Requirements
///
/// Implementations run inside an interrupt handler. They must complete in
/// bounded time, must not allocate, and must never wait on anything the
/// polling context could be holding. The only exclusion they may use is a
/// `critical_section::with` block, which on a single core masks interrupts
/// instead of waiting and may be nested.
pub trait EdgeHandler: Sync {
    /// Handle one logic-level transition of `channel`
    fn on_edge(&self, channel: ChannelId, level: Level);
}

impl<H: EdgeHandler + ?Sized> EdgeHandler for &H {
    fn on_edge(&self, channel: ChannelId, level: Level) {
        (**self).on_edge(channel, level)
    }
}

/// Edge interrupt routing service
///
/// Called from the polling context only, by attach and detach.
pub trait EdgeNotifier {
    /// Start delivering both-edge interrupts for `channel`
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Gpio` if the channel has no pin or its pin
    /// cannot raise edge interrupts.
    fn enable_edges(&mut self, channel: ChannelId) -> Result<()>;

    /// Stop delivering edge interrupts for `channel`
    ///
    /// An interrupt already pending when this is called may still run.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Gpio` if the channel has no pin.
    fn disable_edges(&mut self, channel: ChannelId) -> Result<()>;
}

impl<N: EdgeNotifier + ?Sized> EdgeNotifier for &mut N {
    fn enable_edges(&mut self, channel: ChannelId) -> Result<()> {
        (**self).enable_edges(channel)
    }

    fn disable_edges(&mut self, channel: ChannelId) -> Result<()> {
        (**self).disable_edges(channel)
    }
}
