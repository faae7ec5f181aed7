//! Async AT command engine for Quectel EC21 LTE modules.
//!
//! The engine drives an EC21 over a UART (any `AsyncRead + AsyncWrite`
//! byte stream) plus a handful of control lines:
//!
//! - [`Modem`] owns the transport and runs one AT exchange at a time:
//!   framing, URC capture, command execution, prompt waits, the
//!   power/boot/registration lifecycle and buffer-mode sockets.
//! - [`ModemHandle`] puts a `Modem` on a worker task behind a mailbox so
//!   several tasks can share it without interleaving exchanges.
//! - [`NetworkInterface`] and [`ModemSocket`] wrap a handle in the shape of
//!   a host network stack.
//!
//! # Example
//!
//! ```rust,ignore
//! use wiolte_modem::{spawn_modem_worker, ControlLines, Modem, ModemConfig, SocketType};
//!
//! let modem = Modem::new(uart, ControlLines::latched(false), ModemConfig::default());
//! let (handle, _task) = spawn_modem_worker(modem);
//!
//! handle.supply_power(true).await?;
//! if handle.turn_on_or_reset().await? {
//!     handle.activate("soracom.io", "sora", "sora", timeout).await?;
//!     let id = handle.open("example.com", 80, SocketType::Tcp, timeout).await?;
//!     handle.send(id, b"GET / HTTP/1.0\r\n\r\n", timeout).await?;
//! }
//! ```

mod config;
mod error;
mod executor;
mod handle;
mod info;
mod lifecycle;
mod lines;
mod modem;
mod netif;
mod pool;
mod prompt;
mod socket;
mod transport;
mod urc;

pub use config::{ModemConfig, PdpAuthentication};
pub use error::{ModemError, ModemResult};
pub use executor::{CommandOutcome, ResponseMatcher};
pub use handle::{spawn_modem_worker, ModemHandle};
pub use lines::{ControlLines, InputLine, LatchedLine, LineError, OutputLine, StaticInput};
pub use modem::{Modem, ModemState};
pub use netif::{InterfaceStatus, ModemSocket, NetworkInterface};
pub use pool::{live_connect_ids, ConnectId, ConnectionPool};
pub use transport::Transport;
pub use urc::{Intercepted, UrcQueue};

pub use wiolte_at::{
    Command, RegistrationDomain, RegistrationStatus, SignalQuality, SocketType, Urc,
    MAX_CONNECTIONS, MAX_SOCKET_DATA_SIZE,
};
