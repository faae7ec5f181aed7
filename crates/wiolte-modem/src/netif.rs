//! Network interface and stream socket on top of a [`ModemHandle`].
//!
//! These mirror the shape of a host network stack: an interface that is
//! brought up and connected to an APN, and sockets that connect, send and
//! receive. Every call goes through the modem worker, so interfaces and
//! sockets may live on different tasks.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use wiolte_at::{SignalQuality, SocketType, MAX_SOCKET_DATA_SIZE};

use crate::error::{ModemError, ModemResult};
use crate::handle::ModemHandle;
use crate::pool::ConnectId;

// ============================================================================
// Network Interface
// ============================================================================

/// Identity and signal snapshot returned by [`NetworkInterface::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceStatus {
    pub imei: Option<String>,
    pub imsi: Option<String>,
    pub signal: Option<SignalQuality>,
}

/// The LTE link as a network interface.
#[derive(Debug)]
pub struct NetworkInterface<T> {
    modem: ModemHandle<T>,
    active: bool,
    connected: bool,
}

impl<T> NetworkInterface<T> {
    pub fn new(modem: ModemHandle<T>) -> Self {
        NetworkInterface {
            modem,
            active: false,
            connected: false,
        }
    }

    pub fn modem(&self) -> &ModemHandle<T> {
        &self.modem
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Bring the interface up (supply on, boot, wait for SIM) or down
    /// (supply off). Returns whether the interface is now in the requested
    /// state.
    pub async fn set_active(&mut self, active: bool) -> ModemResult<bool> {
        if self.active == active {
            return Ok(true);
        }
        if active {
            self.modem.supply_power(true).await?;
            if !self.modem.turn_on_or_reset().await? {
                return Ok(false);
            }
            self.active = true;
            info!("interface up");
        } else {
            self.modem.supply_power(false).await?;
            self.active = false;
            self.connected = false;
            info!("interface down");
        }
        Ok(true)
    }

    /// Register and activate the PDP context for `access_point`.
    pub async fn connect(&mut self, access_point: &str, user: &str, password: &str) -> ModemResult<()> {
        if !self.active {
            return Err(ModemError::NotActive);
        }
        let timeout = self.modem.config().socket_timeout();
        if self
            .modem
            .activate(access_point, user, password, timeout)
            .await?
        {
            self.connected = true;
        }
        Ok(())
    }

    /// Mark the interface disconnected. The PDP context stays up on the
    /// module until the supply is switched off.
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub async fn status(&self) -> ModemResult<InterfaceStatus> {
        Ok(InterfaceStatus {
            imei: self.modem.imei().await?,
            imsi: self.modem.imsi().await?,
            signal: self.modem.signal_quality().await?,
        })
    }

    /// Resolve `host` to socket addresses with the module's DNS client.
    /// Entries that are not IP addresses are skipped.
    pub async fn resolve(&self, host: &str, port: u16) -> ModemResult<Vec<SocketAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }
        let timeout = self.modem.config().dns_timeout();
        let addresses = self.modem.resolve(host, timeout).await?;
        Ok(addresses
            .iter()
            .filter_map(|address| address.parse::<IpAddr>().ok())
            .map(|ip| SocketAddr::new(ip, port))
            .collect())
    }
}

// ============================================================================
// Socket
// ============================================================================

/// A client socket carried by the module.
#[derive(Debug)]
pub struct ModemSocket<T> {
    modem: ModemHandle<T>,
    socket_type: SocketType,
    connect_id: Option<ConnectId>,
    timeout: Duration,
}

impl<T> ModemSocket<T> {
    pub fn new(modem: ModemHandle<T>, socket_type: SocketType) -> Self {
        let timeout = modem.config().socket_timeout();
        ModemSocket {
            modem,
            socket_type,
            connect_id: None,
            timeout,
        }
    }

    /// Use `timeout` for every operation instead of the configured default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn connect_id(&self) -> Option<ConnectId> {
        self.connect_id
    }

    fn connected_id(&self) -> ModemResult<ConnectId> {
        self.connect_id.ok_or(ModemError::NotConnected)
    }

    pub async fn connect(&mut self, host: &str, port: u16) -> ModemResult<()> {
        let connect_id = self
            .modem
            .open(host, port, self.socket_type, self.timeout)
            .await?;
        self.connect_id = Some(connect_id);
        Ok(())
    }

    /// Send as much of `data` as fits in one module transfer. Returns the
    /// number of bytes sent, zero if the module did not confirm them.
    pub async fn send(&self, data: &[u8]) -> ModemResult<usize> {
        let connect_id = self.connected_id()?;
        let chunk = &data[..data.len().min(MAX_SOCKET_DATA_SIZE)];
        if self.modem.send(connect_id, chunk, self.timeout).await? {
            Ok(chunk.len())
        } else {
            Ok(0)
        }
    }

    /// Send all of `data`, split into module-sized transfers.
    pub async fn send_all(&self, data: &[u8]) -> ModemResult<()> {
        let connect_id = self.connected_id()?;
        for chunk in data.chunks(MAX_SOCKET_DATA_SIZE) {
            if !self.modem.send(connect_id, chunk, self.timeout).await? {
                return Err(ModemError::Timeout {
                    operation: "socket send",
                });
            }
        }
        Ok(())
    }

    /// Fetch up to `max_len` bytes that have already arrived. Empty when
    /// nothing is waiting.
    pub async fn recv(&self, max_len: usize) -> ModemResult<Vec<u8>> {
        let connect_id = self.connected_id()?;
        let received = self.modem.receive(connect_id, max_len, self.timeout).await?;
        Ok(received.unwrap_or_default())
    }

    /// Read exactly `len` bytes, polling the module until they have all
    /// arrived or the socket timeout passes.
    pub async fn read_exact(&self, len: usize) -> ModemResult<Vec<u8>> {
        let connect_id = self.connected_id()?;
        let deadline = Instant::now() + self.timeout;
        let poll_interval = self.modem.config().read_poll_interval();
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            if !self.modem.is_open(connect_id).await? {
                return Err(ModemError::NotConnected);
            }
            let chunk = self.recv(len - data.len()).await?;
            if chunk.is_empty() {
                if Instant::now() >= deadline {
                    return Err(ModemError::Timeout {
                        operation: "socket read",
                    });
                }
                tokio::time::sleep(poll_interval).await;
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Close the connection. Closing a socket that is not connected does
    /// nothing.
    pub async fn close(&mut self) -> ModemResult<bool> {
        match self.connect_id.take() {
            Some(connect_id) => {
                debug!(connect_id, "closing socket");
                self.modem.close(connect_id, self.timeout).await
            }
            None => Ok(false),
        }
    }
}
