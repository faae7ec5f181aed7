//! Error types for the modem engine.

use thiserror::Error;
use wiolte_at::{AtError, RegistrationDomain};

use crate::lines::LineError;

/// Errors raised by modem operations.
///
/// Soft failures (a command that simply was not answered in time, a socket
/// that is not open) are reported through `Ok(false)` / `Ok(None)` by the
/// operations themselves. The variants here are for failures the caller has
/// to act on.
#[derive(Debug, Error)]
pub enum ModemError {
    /// An operation that requires a reply did not get one in time.
    #[error("timed out waiting for {operation}")]
    Timeout { operation: &'static str },

    /// The module answered with something the engine cannot make sense of.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A reply line could not be parsed.
    #[error("malformed reply: {0}")]
    Parse(#[from] AtError),

    /// Every connection id is in use.
    #[error("all {max} connection ids are in use")]
    ResourceExhausted { max: u8 },

    /// Registration reported "not searching" or "unknown".
    #[error("{domain} registration failed with status {status}")]
    RegistrationDenied { domain: RegistrationDomain, status: u8 },

    /// `+QIOPEN` reported a non-zero error code.
    #[error("connection {connect_id} failed to open (error {code})")]
    SocketOpen { connect_id: u8, code: u16 },

    /// A payload larger than a single `AT+QISEND` can carry.
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// The network interface has not been activated.
    #[error("network interface is not active")]
    NotActive,

    /// The socket has no open connection.
    #[error("socket is not connected")]
    NotConnected,

    /// A control line could not be driven or sampled.
    #[error("control line error: {0}")]
    Line(#[from] LineError),

    /// The UART transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker task owning the modem has exited.
    #[error("modem worker has stopped")]
    WorkerStopped,
}

/// Result type for modem operations.
pub type ModemResult<T> = Result<T, ModemError>;
