//! Metrics infrastructure for the wiolte modem engine.
//!
//! This crate describes every metric the engine records. It re-exports the
//! `metrics` crate for convenience and defines all metrics as structured
//! [`Metric`] constants to avoid typos and keep names, units and label keys
//! in one place.
//!
//! # Example
//!
//! ```rust,ignore
//! use wiolte_metrics::{MetricLabels, metric_defs, describe_metrics};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! let labels = MetricLabels::new("wio-lte-1").with_command("AT+QIOPEN");
//! metrics::counter!(metric_defs::AT_COMMANDS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

/// A metric declaration with its metadata.
///
/// # Example
///
/// ```rust
/// use wiolte_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const BYTES_SENT: Metric = Metric::counter("wiolte.socket.tx_bytes")
///     .with_description("Payload bytes written to sockets")
///     .with_unit(Unit::Bytes)
///     .with_labels(&["modem"]);
///
/// assert_eq!(BYTES_SENT.name, "wiolte.socket.tx_bytes");
/// assert_eq!(BYTES_SENT.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "wiolte.at.commands").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the engine.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // AT Command Layer
    // ========================================================================

    /// AT commands written to the module.
    ///
    /// Labels: modem, command
    pub const AT_COMMANDS: Metric = Metric::counter("wiolte.at.commands")
        .with_description("AT commands written to the module")
        .with_unit(Unit::Count)
        .with_labels(&["modem", "command"]);

    /// AT commands that hit their deadline without a satisfying reply.
    ///
    /// Labels: modem, command
    pub const AT_COMMAND_TIMEOUTS: Metric = Metric::counter("wiolte.at.command_timeouts")
        .with_description("AT commands that timed out")
        .with_unit(Unit::Count)
        .with_labels(&["modem", "command"]);

    /// Time from writing a command to its satisfying reply.
    ///
    /// Labels: modem, command
    pub const AT_COMMAND_LATENCY: Metric = Metric::histogram("wiolte.at.command_latency_ms")
        .with_description("AT command round-trip time in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["modem", "command"]);

    /// Unsolicited result codes intercepted by the URC filter.
    ///
    /// Labels: modem, kind
    pub const AT_URCS: Metric = Metric::counter("wiolte.at.urcs")
        .with_description("Unsolicited result codes received")
        .with_unit(Unit::Count)
        .with_labels(&["modem", "kind"]);

    // ========================================================================
    // Socket Layer
    // ========================================================================

    /// Payload bytes written to sockets.
    ///
    /// Labels: modem
    pub const SOCKET_TX_BYTES: Metric = Metric::counter("wiolte.socket.tx_bytes")
        .with_description("Payload bytes written to sockets")
        .with_unit(Unit::Bytes)
        .with_labels(&["modem"]);

    /// Payload bytes read from sockets.
    ///
    /// Labels: modem
    pub const SOCKET_RX_BYTES: Metric = Metric::counter("wiolte.socket.rx_bytes")
        .with_description("Payload bytes read from sockets")
        .with_unit(Unit::Bytes)
        .with_labels(&["modem"]);

    /// Connections currently tracked as open.
    ///
    /// Labels: modem
    pub const SOCKET_OPEN_CONNECTIONS: Metric = Metric::gauge("wiolte.socket.open_connections")
        .with_description("Connections currently tracked as open")
        .with_unit(Unit::Count)
        .with_labels(&["modem"]);

    /// Every metric, for [`describe_metrics`](super::describe_metrics).
    pub const ALL: &[Metric] = &[
        AT_COMMANDS,
        AT_COMMAND_TIMEOUTS,
        AT_COMMAND_LATENCY,
        AT_URCS,
        SOCKET_TX_BYTES,
        SOCKET_RX_BYTES,
        SOCKET_OPEN_CONNECTIONS,
    ];
}

/// Labels attached to engine metrics.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Modem instance name.
    pub modem: String,
    /// AT command name without arguments, when the metric is per command.
    pub command: Option<String>,
}

impl MetricLabels {
    /// Creates labels for a modem instance.
    pub fn new(modem: impl Into<String>) -> Self {
        Self {
            modem: modem.into(),
            command: None,
        }
    }

    /// Adds the command label. Arguments after `=` or `?` are dropped so that
    /// label cardinality stays bounded.
    pub fn with_command(mut self, command: &str) -> Self {
        let name = command
            .split(|c| c == '=' || c == '?')
            .next()
            .unwrap_or(command);
        self.command = Some(name.to_string());
        self
    }

    /// Converts the labels to the key/value form used by the metrics macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("modem", self.modem.clone())];
        if let Some(command) = &self.command {
            labels.push(("command", command.clone()));
        }
        labels
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics used by the engine.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
