//! Drive a Wio LTE module from a host.
//!
//! The module's UART is reached through a TCP serial bridge (ser2net or a
//! board-side relay); the control lines are latched in software, so boots
//! always take the reset path.

pub mod config;
pub mod session;

pub use config::{AccessPoint, RunnerConfig, RunnerError, RunnerResult};
pub use session::Session;
