//! Modem configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wiolte_at::{Authentication, MAX_LINE_LENGTH};

// ============================================================================
// Configuration Types
// ============================================================================

/// PDP context authentication, as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdpAuthentication {
    /// No authentication.
    None,
    /// PAP.
    #[default]
    Pap,
    /// CHAP.
    Chap,
    /// PAP or CHAP.
    PapOrChap,
}

impl From<PdpAuthentication> for Authentication {
    fn from(auth: PdpAuthentication) -> Self {
        match auth {
            PdpAuthentication::None => Authentication::None,
            PdpAuthentication::Pap => Authentication::Pap,
            PdpAuthentication::Chap => Authentication::Chap,
            PdpAuthentication::PapOrChap => Authentication::PapOrChap,
        }
    }
}

/// Configuration for a [`Modem`](crate::Modem).
///
/// All durations are in milliseconds so the struct maps directly onto YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Instance name, used as the `modem` metric label.
    pub name: String,
    /// PDP context used for activation and sockets.
    pub context_id: u8,
    /// Port the module routes URCs to.
    pub urc_port: String,
    /// Authentication method for the PDP context.
    pub authentication: PdpAuthentication,
    /// Longest response line kept; longer lines are truncated.
    pub max_line_length: usize,

    /// Default reply timeout for ordinary commands.
    pub command_timeout_ms: u64,
    /// How long to wait for `RDY` on each boot attempt.
    pub boot_timeout_ms: u64,
    /// Number of `RDY` waits before giving up.
    pub boot_attempts: u32,
    /// Interval between samples of the status line.
    pub busy_poll_interval_ms: u64,
    /// Number of status line samples before giving up.
    pub busy_poll_attempts: u32,
    /// Settle time between releasing the power key and pressing it.
    pub power_key_delay_ms: u64,
    /// Length of the power key press.
    pub power_key_pulse_ms: u64,
    /// Length of the reset pulse.
    pub reset_pulse_ms: u64,
    /// Settle time after the reset pulse.
    pub reset_settle_ms: u64,
    /// Pause between `AT+CPIN?` polls.
    pub sim_poll_interval_ms: u64,
    /// Pause between registration polls.
    pub registration_poll_interval_ms: u64,
    /// Default timeout for socket open, send and receive.
    pub socket_timeout_ms: u64,
    /// Default timeout for a DNS lookup, including the result URCs.
    pub dns_timeout_ms: u64,
    /// Pause between reads while waiting for more socket data.
    pub read_poll_interval_ms: u64,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            name: "wio-lte".to_string(),
            context_id: 1,
            urc_port: "uart1".to_string(),
            authentication: PdpAuthentication::default(),
            max_line_length: MAX_LINE_LENGTH,
            command_timeout_ms: 5_000,
            boot_timeout_ms: 5_000,
            boot_attempts: 15,
            busy_poll_interval_ms: 100,
            busy_poll_attempts: 50,
            power_key_delay_ms: 100,
            power_key_pulse_ms: 200,
            reset_pulse_ms: 200,
            reset_settle_ms: 300,
            sim_poll_interval_ms: 1_000,
            registration_poll_interval_ms: 1_000,
            socket_timeout_ms: 30_000,
            dns_timeout_ms: 60_000,
            read_poll_interval_ms: 100,
        }
    }
}

impl ModemConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.busy_poll_interval_ms)
    }

    pub fn power_key_delay(&self) -> Duration {
        Duration::from_millis(self.power_key_delay_ms)
    }

    pub fn power_key_pulse(&self) -> Duration {
        Duration::from_millis(self.power_key_pulse_ms)
    }

    pub fn reset_pulse(&self) -> Duration {
        Duration::from_millis(self.reset_pulse_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn sim_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sim_poll_interval_ms)
    }

    pub fn registration_poll_interval(&self) -> Duration {
        Duration::from_millis(self.registration_poll_interval_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn read_poll_interval(&self) -> Duration {
        Duration::from_millis(self.read_poll_interval_ms)
    }
}
