//! Receiver error types
//!
//! Errors reported by attach and detach. Dispatch has no error path: faults
//! in user closures propagate as panics.

use core::fmt;

use super::ChannelId;
use crate::platform::PlatformError;

/// Errors from receiver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiverError {
    /// Channel id outside the configured range
    InvalidChannel {
        /// Rejected channel
        channel: ChannelId,
        /// Configured channel count
        count: usize,
    },
    /// Edge interrupt routing failed
    Platform(PlatformError),
}

impl From<PlatformError> for ReceiverError {
    fn from(error: PlatformError) -> Self {
        ReceiverError::Platform(error)
    }
}

impl fmt::Display for ReceiverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverError::InvalidChannel { channel, count } => {
                write!(f, "invalid channel {} (configured for {})", channel, count)
            }
            ReceiverError::Platform(e) => write!(f, "platform error: {}", e),
        }
    }
}
