//! Platform abstraction traits
//!
//! This module defines the traits that platform implementations must provide.

pub mod edge;

// Re-export trait interfaces
pub use edge::{ChannelId, EdgeHandler, EdgeNotifier, Level};
