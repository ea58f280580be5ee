//! Mock platform implementation for testing
//!
//! This module provides a mock edge-interrupt controller that stands in for
//! the pin-change hardware, so the receiver can be exercised without a board.
//!
//! # Feature Gate
//!
//! This module is available in two contexts:
//! - During test builds (`#[cfg(test)]`)
//! - When the `mock` feature is enabled
//!
//! # Example
//!
//! ```ignore
//! use pwm_receiver::platform::mock::MockEdgeController;
//!
//! let controller = MockEdgeController::new();
//! let mut receiver = PwmReceiver::<_, _, u64, 16>::new(&capture, &controller);
//! receiver.attach(ChannelId::new(0), &on_change)?;
//!
//! // Simulate the interrupt handler
//! controller.fire(&capture, ChannelId::new(0), Level::High);
//! ```

#![cfg(any(test, feature = "mock"))]

mod edge;

pub use edge::MockEdgeController;
