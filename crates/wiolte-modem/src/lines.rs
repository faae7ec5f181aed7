//! Control lines wired between the host and the EC21.
//!
//! The engine never touches hardware directly. Boards provide an
//! [`OutputLine`] for each driven pin and an [`InputLine`] for the status
//! pin; [`ControlLines`] bundles them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

/// A control line could not be driven or sampled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}: {reason}")]
pub struct LineError {
    /// Name of the line.
    pub line: String,
    /// What went wrong.
    pub reason: String,
}

impl LineError {
    pub fn new(line: impl Into<String>, reason: impl Into<String>) -> Self {
        LineError {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

/// A digital output driven by the host.
pub trait OutputLine: Send {
    /// Drive the line to the given logic level.
    fn set_level(&mut self, high: bool) -> Result<(), LineError>;

    /// Drive the line high.
    fn set_high(&mut self) -> Result<(), LineError> {
        self.set_level(true)
    }

    /// Drive the line low.
    fn set_low(&mut self) -> Result<(), LineError> {
        self.set_level(false)
    }
}

/// A digital input sampled by the host.
pub trait InputLine: Send {
    /// Sample the line. `true` means high.
    fn is_high(&mut self) -> Result<bool, LineError>;
}

/// An output that remembers its level in shared state.
///
/// Clones observe the same level, which lets a bridge or a test watch what
/// the engine drove without real hardware behind it.
#[derive(Debug, Clone)]
pub struct LatchedLine {
    name: &'static str,
    level: Arc<AtomicBool>,
}

impl LatchedLine {
    pub fn new(name: &'static str) -> Self {
        LatchedLine {
            name,
            level: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last level driven.
    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

impl OutputLine for LatchedLine {
    fn set_level(&mut self, high: bool) -> Result<(), LineError> {
        trace!(line = self.name, high, "drive control line");
        self.level.store(high, Ordering::SeqCst);
        Ok(())
    }
}

/// An input whose level is set from outside, e.g. a strap or a config value.
#[derive(Debug, Clone)]
pub struct StaticInput {
    level: Arc<AtomicBool>,
}

impl StaticInput {
    pub fn new(high: bool) -> Self {
        StaticInput {
            level: Arc::new(AtomicBool::new(high)),
        }
    }

    /// Change the level seen by future samples.
    pub fn set(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }
}

impl InputLine for StaticInput {
    fn is_high(&mut self) -> Result<bool, LineError> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Every line the engine drives or samples.
pub struct ControlLines {
    /// Reset input of the module. Held high while running; a low pulse resets.
    pub reset: Box<dyn OutputLine>,
    /// Power key. A high pulse boots the module.
    pub power_key: Box<dyn OutputLine>,
    /// Supply switch for the module.
    pub module_power: Box<dyn OutputLine>,
    /// DTR; low keeps the UART awake.
    pub dtr: Box<dyn OutputLine>,
    /// Wake-up input of the module.
    pub wake: Box<dyn OutputLine>,
    /// Disable (W_DISABLE) input of the module.
    pub disable: Box<dyn OutputLine>,
    /// Status output of the module. High while the module is off or booting.
    pub status: Box<dyn InputLine>,
}

impl ControlLines {
    /// Lines that do nothing but remember their level. The status input
    /// reads `status_high`.
    pub fn latched(status_high: bool) -> Self {
        ControlLines {
            reset: Box::new(LatchedLine::new("reset")),
            power_key: Box::new(LatchedLine::new("power_key")),
            module_power: Box::new(LatchedLine::new("module_power")),
            dtr: Box::new(LatchedLine::new("dtr")),
            wake: Box::new(LatchedLine::new("wake")),
            disable: Box::new(LatchedLine::new("disable")),
            status: Box::new(StaticInput::new(status_high)),
        }
    }

    /// Put every output at its idle level: supply off, reset and disable
    /// released (high), everything else low.
    pub fn set_idle_levels(&mut self) -> Result<(), LineError> {
        self.dtr.set_low()?;
        self.power_key.set_low()?;
        self.module_power.set_low()?;
        self.reset.set_high()?;
        self.disable.set_high()?;
        self.wake.set_low()
    }

    /// Whether the module reports itself busy.
    pub fn is_busy(&mut self) -> Result<bool, LineError> {
        self.status.is_high()
    }
}

impl std::fmt::Debug for ControlLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLines").finish_non_exhaustive()
    }
}
