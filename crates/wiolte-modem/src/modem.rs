//! The modem instance: transport, control lines and engine state.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wiolte_metrics::{metric_defs, MetricLabels};

use crate::config::ModemConfig;
use crate::lines::ControlLines;
use crate::pool::{ConnectId, ConnectionPool};
use crate::transport::Transport;
use crate::urc::UrcQueue;

// ============================================================================
// Modem State
// ============================================================================

/// Lifecycle state of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    /// Not booted, or the last boot attempt failed.
    Off,
    /// Pulsing the reset line and waiting for `RDY`.
    Resetting,
    /// Pressing the power key and waiting for `RDY`.
    TurningOn,
    /// Booted; running the echo/URC/clock handshake.
    HandshakeInProgress,
    /// Polling `AT+CPIN?`.
    WaitingSimReady,
    /// SIM ready; waiting for network registration.
    Registering,
    /// PDP context active; sockets may be opened.
    Activated,
}

impl std::fmt::Display for ModemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModemState::Off => "off",
            ModemState::Resetting => "resetting",
            ModemState::TurningOn => "turning on",
            ModemState::HandshakeInProgress => "handshake",
            ModemState::WaitingSimReady => "waiting for SIM",
            ModemState::Registering => "registering",
            ModemState::Activated => "activated",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Modem
// ============================================================================

/// An EC21 module on a UART.
///
/// `Modem` owns the transport exclusively. All operations take `&mut self`,
/// so one exchange is in flight at a time. Share it between tasks through a
/// [`ModemHandle`](crate::ModemHandle).
pub struct Modem<T> {
    pub(crate) transport: Transport<T>,
    pub(crate) lines: ControlLines,
    pub(crate) config: ModemConfig,
    pub(crate) pool: ConnectionPool,
    pub(crate) urcs: UrcQueue,
    pub(crate) labels: MetricLabels,
    pub(crate) powered: bool,
    state: ModemState,
    cancel: CancellationToken,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// Wrap a UART and its control lines. Nothing is written until an
    /// operation is called.
    pub fn new(io: T, lines: ControlLines, config: ModemConfig) -> Self {
        let cancel = CancellationToken::new();
        let labels = MetricLabels::new(config.name.clone());
        Modem {
            transport: Transport::new(io, cancel.clone()),
            lines,
            config,
            pool: ConnectionPool::new(),
            urcs: UrcQueue::new(),
            labels,
            powered: false,
            state: ModemState::Off,
            cancel,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModemState {
        self.state
    }

    /// Whether the supply switch is on.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Connections tracked as open.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Whether `connect_id` is tracked as open.
    pub fn is_open(&self, connect_id: ConnectId) -> bool {
        self.pool.is_open(connect_id)
    }

    /// Number of URCs captured but not yet processed.
    pub fn pending_urcs(&self) -> usize {
        self.urcs.len()
    }

    /// Token that aborts the wait in progress. Cancelling it makes pending
    /// reads return as if their deadline had passed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install a fresh cancellation token, e.g. after the previous one fired.
    pub fn set_cancellation_token(&mut self, cancel: CancellationToken) {
        self.transport.set_cancellation_token(cancel.clone());
        self.cancel = cancel;
    }

    /// Give back the UART and the control lines.
    pub fn into_parts(self) -> (T, ControlLines) {
        (self.transport.into_inner(), self.lines)
    }

    pub(crate) fn set_state(&mut self, state: ModemState) {
        if self.state != state {
            debug!(modem = %self.config.name, from = %self.state, to = %state, "state change");
            self.state = state;
        }
    }

    pub(crate) fn record_open_connections(&self) {
        metrics::gauge!(metric_defs::SOCKET_OPEN_CONNECTIONS.name, &self.labels.to_labels())
            .set(self.pool.len() as f64);
    }
}

impl<T> std::fmt::Debug for Modem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modem")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
