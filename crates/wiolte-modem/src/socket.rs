//! Socket open, send, receive and close over `AT+QI*` commands.
//!
//! Sockets use buffer access mode: received data waits in the module until
//! it is fetched with `AT+QIRD`, and each `AT+QISEND` carries at most
//! [`MAX_SOCKET_DATA_SIZE`] bytes.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use wiolte_at::{
    is_error_result, parse_read_length, Command, OpenResult, SocketType, ERROR,
    MAX_SOCKET_DATA_SIZE, OK, OPEN_PREFIX, READ_PREFIX, SEND_FAIL, SEND_OK, SEND_PROMPT,
};
use wiolte_metrics::metric_defs;

use crate::error::{ModemError, ModemResult};
use crate::executor::{remaining, ResponseMatcher};
use crate::modem::Modem;
use crate::pool::{live_connect_ids, ConnectId};

impl<T: AsyncRead + AsyncWrite + Unpin> Modem<T> {
    /// Pick a free connection id, reconciling against the module's own
    /// `AT+QISTATE?` listing.
    pub async fn allocate_connect_id(&mut self, timeout: Duration) -> ModemResult<ConnectId> {
        let outcome = self
            .execute(&Command::SocketState, &ResponseMatcher::final_result(), timeout)
            .await?;
        if !outcome.success {
            return Err(ModemError::Timeout {
                operation: "socket state listing",
            });
        }
        if !outcome.is_ok() {
            return Err(ModemError::Protocol("socket state listing rejected".to_string()));
        }
        let live = live_connect_ids(&outcome.lines)?;
        trace!(?live, "connection ids in use on the module");
        self.pool.allocate(&live)
    }

    /// Open a connection to `host:port`. Returns the connection id.
    ///
    /// Fails with [`ModemError::ResourceExhausted`] before writing the open
    /// command when every id is in use, [`ModemError::SocketOpen`] when the
    /// module reports a non-zero error code and [`ModemError::Timeout`] when
    /// the `+QIOPEN` result does not arrive in time.
    pub async fn open(
        &mut self,
        host: &str,
        port: u16,
        socket_type: SocketType,
        timeout: Duration,
    ) -> ModemResult<ConnectId> {
        self.process_urcs();
        let deadline = Instant::now() + timeout;

        let connect_id = self.allocate_connect_id(timeout).await?;
        debug!(connect_id, host, port, %socket_type, "opening connection");

        let command = Command::OpenSocket {
            context_id: self.config.context_id,
            connect_id,
            socket_type,
            host: host.to_string(),
            port,
        };
        let accepted = self
            .execute(&command, &ResponseMatcher::final_result(), remaining(deadline))
            .await?;
        if !accepted.success {
            return Err(ModemError::Timeout {
                operation: "socket open",
            });
        }
        if !accepted.is_ok() {
            return Err(ModemError::Protocol(format!(
                "open command for connection {} rejected",
                connect_id
            )));
        }

        let prefix = format!("{}{},", String::from_utf8_lossy(OPEN_PREFIX), connect_id);
        let Some(line) = self
            .wait_response(prefix.as_bytes(), remaining(deadline))
            .await?
        else {
            return Err(ModemError::Timeout {
                operation: "socket open",
            });
        };
        let result = OpenResult::parse(&line)?;
        if !result.is_success() {
            return Err(ModemError::SocketOpen {
                connect_id,
                code: result.error_code,
            });
        }

        self.pool.insert(connect_id, socket_type);
        self.record_open_connections();
        info!(connect_id, host, port, %socket_type, "connection open");
        Ok(connect_id)
    }

    /// Send `data` on an open connection.
    ///
    /// `Ok(false)` without touching the transport if `connect_id` is not
    /// open; `Ok(false)` as well if the prompt or `SEND OK` does not arrive
    /// in time, or the module answers `SEND FAIL`.
    pub async fn send(
        &mut self,
        connect_id: ConnectId,
        data: &[u8],
        timeout: Duration,
    ) -> ModemResult<bool> {
        self.process_urcs();
        if !self.pool.is_open(connect_id) {
            debug!(connect_id, "send on a connection that is not open");
            return Ok(false);
        }
        if data.len() > MAX_SOCKET_DATA_SIZE {
            return Err(ModemError::PayloadTooLarge {
                len: data.len(),
                max: MAX_SOCKET_DATA_SIZE,
            });
        }
        if data.is_empty() {
            return Ok(true);
        }

        let deadline = Instant::now() + timeout;
        self.write_command(&Command::SendData {
            connect_id,
            length: data.len(),
        })
        .await?;
        if !self.wait_for_prompt(SEND_PROMPT, remaining(deadline)).await? {
            warn!(connect_id, "no send prompt");
            self.process_urcs();
            return Ok(false);
        }
        self.transport.write_all(data).await?;

        let matcher = ResponseMatcher::one_of(&[SEND_OK, SEND_FAIL, ERROR]);
        let outcome = self.collect_until(&matcher, deadline).await?;
        let sent = outcome.terminal().is_some_and(|line| line.as_ref() == SEND_OK);
        if sent {
            metrics::counter!(metric_defs::SOCKET_TX_BYTES.name, &self.labels.to_labels())
                .increment(data.len() as u64);
        } else {
            warn!(connect_id, terminal = ?outcome.terminal(), "send not confirmed");
        }
        Ok(sent)
    }

    /// Fetch buffered data into `buffer`. Returns the number of bytes read,
    /// possibly zero.
    ///
    /// `Ok(None)` without touching the transport if `connect_id` is not
    /// open; `Ok(None)` as well if the module answers with an error or does
    /// not answer in time. A length field that cannot be parsed, or fewer
    /// payload bytes than announced, is a protocol violation.
    pub async fn receive(
        &mut self,
        connect_id: ConnectId,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> ModemResult<Option<usize>> {
        self.process_urcs();
        if !self.pool.is_open(connect_id) {
            debug!(connect_id, "receive on a connection that is not open");
            return Ok(None);
        }
        let request = buffer.len().min(MAX_SOCKET_DATA_SIZE);
        if request == 0 {
            return Ok(Some(0));
        }

        let deadline = Instant::now() + timeout;
        self.write_command(&Command::ReadData {
            connect_id,
            length: request,
        })
        .await?;

        let matcher = ResponseMatcher::predicate(|line: &[u8]| {
            line.starts_with(READ_PREFIX) || is_error_result(line)
        });
        let outcome = self.collect_until(&matcher, deadline).await?;
        let Some(header) = outcome.terminal() else {
            return Ok(None);
        };
        if is_error_result(header) {
            debug!(connect_id, "read rejected");
            return Ok(None);
        }

        let length = parse_read_length(header)?;
        if length > request {
            return Err(ModemError::Protocol(format!(
                "module announced {} bytes for a {} byte read",
                length, request
            )));
        }
        if length > 0 && !self.transport.read_exact(&mut buffer[..length], deadline).await? {
            if self.transport.is_cancelled() {
                return Ok(None);
            }
            return Err(ModemError::Protocol(format!(
                "fewer than the announced {} bytes arrived",
                length
            )));
        }
        if self.wait_response(OK, remaining(deadline)).await?.is_none() {
            return Ok(None);
        }

        if length > 0 {
            trace!(connect_id, length, "received");
            metrics::counter!(metric_defs::SOCKET_RX_BYTES.name, &self.labels.to_labels())
                .increment(length as u64);
        }
        Ok(Some(length))
    }

    /// Close a connection. The id is released locally whatever the module
    /// answers. `Ok(false)` without touching the transport if the id was not
    /// open.
    pub async fn close(&mut self, connect_id: ConnectId, timeout: Duration) -> ModemResult<bool> {
        self.process_urcs();
        if !self.pool.is_open(connect_id) {
            debug!(connect_id, "already closed");
            return Ok(false);
        }

        let closed = self
            .execute_ok(&Command::CloseSocket { connect_id }, timeout)
            .await;
        self.pool.release(connect_id);
        self.record_open_connections();
        info!(connect_id, "connection closed");
        closed
    }
}
