#![cfg_attr(not(test), no_std)]

//! pwm_receiver - Interrupt-driven PWM pulse-width capture
//!
//! Measures the high time of PWM signals (RC receivers, servo inputs) on
//! multiple channels. Pin-change interrupts capture the pulse widths; the
//! application's main loop drains them and runs a per-channel
//! filter → transform → callback pipeline.
//!
//! - [`receiver`]: capture, latch, pipelines and the polling dispatcher
//! - [`platform`]: edge-interrupt traits the board layer implements, plus mocks
//! - [`core`]: clock trait and logging macros

// Platform abstraction layer
pub mod platform;

// Clock abstraction and logging
pub mod core;

// Capture and dispatch
pub mod receiver;

pub use receiver::{
    ChannelId, PulseDuration, PwmCapture, PwmReceiver, ReceiverError, DEFAULT_CHANNELS,
};
