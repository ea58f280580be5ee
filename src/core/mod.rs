//! Core receiver infrastructure
//!
//! Logging macros and the platform-agnostic traits (clock) that the receiver
//! pipeline is generic over.

pub mod logging;
pub mod traits;
