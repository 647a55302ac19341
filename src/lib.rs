//! Motion and communication engine for the actuator boards of a bus-linked animatronic.
#![cfg_attr(not(test), no_std)]

// Textually scoped logging macros; must stay above every other module.
#[macro_use]
mod fmt;

pub mod address;
pub mod checksum;
pub mod comm;
mod error;
#[cfg(feature = "pico1")]
pub mod hardware;
pub mod motion;
pub mod motor;
pub mod pid;
pub mod pool;
pub mod protocol;
pub mod render;
pub mod service;
pub mod setpoint;
mod shared_constants;

// Re-export commonly used items
pub use address::{Address, BoardId};
pub use comm::{Bus, CommConfig, CommDriver, Outcome};
pub use error::{Error, ErrorCode, Result};
pub use motion::{Motion, MotionStatic};
pub use render::Renderer;
pub use service::Service;
pub use shared_constants::*;
