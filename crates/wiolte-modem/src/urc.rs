//! Unsolicited result code handling.
//!
//! Every framed line passes through [`UrcQueue::intercept`] before any
//! response matcher sees it. `+QIURC:` lines are captured there and acted on
//! later, at the start of the next operation, by [`Modem::process_urcs`].

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace, warn};
use wiolte_at::{Urc, URC_PREFIX};
use wiolte_metrics::metric_defs;

use crate::modem::{Modem, ModemState};

/// URCs captured during command exchanges, oldest first.
#[derive(Debug, Default)]
pub struct UrcQueue {
    pending: VecDeque<Urc>,
}

/// What [`UrcQueue::intercept`] did with a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Intercepted {
    /// An ordinary response line, to be handed to the caller.
    Response(Bytes),
    /// A recognised URC, now queued.
    Queued(&'static str),
    /// A `+QIURC:` line of a kind the engine does not act on.
    Ignored,
}

impl UrcQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one framed line.
    pub fn intercept(&mut self, line: Bytes) -> Intercepted {
        if !line.starts_with(URC_PREFIX) {
            return Intercepted::Response(line);
        }
        match Urc::parse(&line) {
            Some(urc) => {
                trace!(?urc, "captured URC");
                let kind = urc.kind();
                self.pending.push_back(urc);
                Intercepted::Queued(kind)
            }
            None => {
                debug!(line = %String::from_utf8_lossy(&line), "dropped URC");
                Intercepted::Ignored
            }
        }
    }

    pub fn push(&mut self, urc: Urc) {
        self.pending.push_back(urc);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every queued URC.
    pub fn drain(&mut self) -> Vec<Urc> {
        self.pending.drain(..).collect()
    }

    /// Remove and return the queued URCs matching `predicate`, keeping the
    /// rest in order.
    pub fn take_matching(&mut self, predicate: impl Fn(&Urc) -> bool) -> Vec<Urc> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for urc in self.pending.drain(..) {
            if predicate(&urc) {
                taken.push(urc);
            } else {
                kept.push_back(urc);
            }
        }
        self.pending = kept;
        taken
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// Route a framed line through the URC filter, counting what it captured.
    pub(crate) fn filter_line(&mut self, line: Bytes) -> Option<Bytes> {
        match self.urcs.intercept(line) {
            Intercepted::Response(line) => Some(line),
            Intercepted::Queued(kind) => {
                metrics::counter!(
                    metric_defs::AT_URCS.name,
                    &self.labels.with(&[("kind", kind.to_string())])
                )
                .increment(1);
                None
            }
            Intercepted::Ignored => None,
        }
    }

    /// Apply every queued URC to local state. Never touches the transport.
    ///
    /// Called at the start of each public operation so that a connection the
    /// peer closed is no longer reported open.
    pub fn process_urcs(&mut self) {
        if self.urcs.is_empty() {
            return;
        }
        for urc in self.urcs.drain() {
            match urc {
                Urc::SocketClosed { connect_id } => {
                    if self.pool.release(connect_id) {
                        info!(connect_id, "connection closed by peer");
                        self.record_open_connections();
                    }
                }
                Urc::DataReceived { connect_id } => {
                    trace!(connect_id, "data waiting");
                }
                Urc::ContextDeactivated { context_id } => {
                    warn!(context_id, "PDP context deactivated by network");
                    if context_id == self.config.context_id && self.state() == ModemState::Activated {
                        self.set_state(ModemState::Registering);
                    }
                }
                Urc::DnsHeader { .. } | Urc::DnsAddress { .. } => {
                    debug!(?urc, "stale DNS result dropped");
                }
            }
        }
    }
}
