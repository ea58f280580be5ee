//! Core traits for platform-agnostic receiver functionality.
//!
//! This module provides trait abstractions that decouple pulse capture from
//! platform-specific implementations (Embassy, mock, etc.).
//!
//! # Design
//!
//! - Trait definitions are pure and have no feature gates
//! - Mock implementations are always available for host testing
//! - Platform implementations (Embassy) are behind the `embassy` feature

pub mod time;

pub use time::TimeSource;

#[cfg(target_has_atomic = "64")]
pub use time::MockTime;

#[cfg(feature = "embassy")]
pub use time::EmbassyTime;
