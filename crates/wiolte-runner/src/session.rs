//! A modem worker on a UART stream, with the steps the CLI strings together.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wiolte_modem::{
    spawn_modem_worker, ControlLines, Modem, ModemHandle, ModemSocket, NetworkInterface,
    SocketType,
};

use crate::config::{AccessPoint, RunnerConfig, RunnerError, RunnerResult};

pub struct Session<T> {
    handle: ModemHandle<T>,
    interface: NetworkInterface<T>,
    access_point: AccessPoint,
    worker: JoinHandle<()>,
}

impl Session<TcpStream> {
    /// Connect to the configured UART bridge.
    pub async fn connect(config: &RunnerConfig) -> RunnerResult<Self> {
        let bridge_error = |source| RunnerError::Bridge {
            address: config.bridge.clone(),
            source,
        };
        let stream = TcpStream::connect(&config.bridge)
            .await
            .map_err(bridge_error)?;
        stream.set_nodelay(true).map_err(bridge_error)?;
        info!(bridge = %config.bridge, "connected to UART bridge");
        Ok(Session::over(stream, config))
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start a modem worker on `io`.
    pub fn over(io: T, config: &RunnerConfig) -> Self {
        let modem = Modem::new(io, ControlLines::latched(false), config.modem.clone());
        let (handle, worker) = spawn_modem_worker(modem);
        Session {
            interface: NetworkInterface::new(handle.clone()),
            handle,
            access_point: config.access_point.clone(),
            worker,
        }
    }

    pub fn handle(&self) -> &ModemHandle<T> {
        &self.handle
    }

    pub fn interface(&self) -> &NetworkInterface<T> {
        &self.interface
    }

    /// Reset the engine, power the module and wait for the SIM.
    pub async fn bring_up(&mut self) -> RunnerResult<()> {
        if self.interface.is_active() {
            return Ok(());
        }
        self.handle.initialize().await?;
        if !self.interface.set_active(true).await? {
            return Err(RunnerError::BootFailed);
        }
        Ok(())
    }

    /// Bring the module up if needed, then register and activate the PDP
    /// context.
    pub async fn attach(&mut self) -> RunnerResult<()> {
        self.bring_up().await?;
        if self.interface.is_connected() {
            return Ok(());
        }
        let AccessPoint {
            apn,
            user,
            password,
        } = &self.access_point;
        self.interface.connect(apn, user, password).await?;
        if !self.interface.is_connected() {
            return Err(RunnerError::ActivationFailed);
        }
        Ok(())
    }

    /// Open a connection, send `payload`, and collect up to `reply_len`
    /// bytes of reply for at most `wait`.
    pub async fn exchange(
        &self,
        host: &str,
        port: u16,
        socket_type: SocketType,
        payload: &[u8],
        reply_len: usize,
        wait: Duration,
    ) -> RunnerResult<Vec<u8>> {
        let mut socket = ModemSocket::new(self.handle.clone(), socket_type);
        socket.connect(host, port).await?;
        socket.send_all(payload).await?;
        debug!(host, port, bytes = payload.len(), "payload sent");

        let poll_interval = self.handle.config().read_poll_interval();
        let deadline = Instant::now() + wait;
        let mut reply = Vec::new();
        while reply.len() < reply_len && Instant::now() < deadline {
            let chunk = socket.recv(reply_len - reply.len()).await?;
            if chunk.is_empty() {
                let open = match socket.connect_id() {
                    Some(connect_id) => self.handle.is_open(connect_id).await?,
                    None => false,
                };
                if !open {
                    debug!(host, port, "peer closed the connection");
                    break;
                }
                tokio::time::sleep(poll_interval).await;
            }
            reply.extend_from_slice(&chunk);
        }
        socket.close().await?;
        Ok(reply)
    }

    /// Switch the module off and stop the worker.
    pub async fn finish(mut self) -> RunnerResult<()> {
        if self.interface.is_active() {
            self.interface.set_active(false).await?;
        }
        self.handle.shutdown().await?;
        if let Err(e) = self.worker.await {
            warn!("modem worker ended abnormally: {}", e);
        }
        Ok(())
    }
}
