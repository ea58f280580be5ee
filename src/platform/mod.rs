//! Platform abstraction layer
//!
//! This module defines the hardware collaborators the receiver depends on but
//! does not implement: the edge-interrupt controller and the interrupt-side
//! callback it drives. Board support crates implement these traits; the mock
//! implementations drive the receiver on the host.

pub mod error;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use error::{GpioError, PlatformError, Result};
pub use traits::{ChannelId, EdgeHandler, EdgeNotifier, Level};
