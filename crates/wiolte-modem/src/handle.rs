//! A worker task that owns the [`Modem`] and serves requests from any
//! number of callers, one at a time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wiolte_at::{SignalQuality, SocketType, MAX_SOCKET_DATA_SIZE};

use crate::config::ModemConfig;
use crate::error::{ModemError, ModemResult};
use crate::modem::{Modem, ModemState};
use crate::pool::ConnectId;

/// Depth of the request mailbox.
const MAILBOX_DEPTH: usize = 32;

type Reply<R> = oneshot::Sender<ModemResult<R>>;

/// An operation for the worker to run against the modem.
enum Request {
    Initialize {
        reply: Reply<()>,
    },
    SupplyPower {
        on: bool,
        reply: Reply<()>,
    },
    TurnOnOrReset {
        reply: Reply<bool>,
    },
    Activate {
        access_point: String,
        user: String,
        password: String,
        timeout: Duration,
        reply: Reply<bool>,
    },
    Ping {
        reply: Reply<bool>,
    },
    Imei {
        reply: Reply<Option<String>>,
    },
    Imsi {
        reply: Reply<Option<String>>,
    },
    PhoneNumber {
        reply: Reply<Option<String>>,
    },
    SignalQuality {
        reply: Reply<Option<SignalQuality>>,
    },
    LocalAddress {
        reply: Reply<Option<String>>,
    },
    Resolve {
        host: String,
        timeout: Duration,
        reply: Reply<Vec<String>>,
    },
    Open {
        host: String,
        port: u16,
        socket_type: SocketType,
        timeout: Duration,
        reply: Reply<ConnectId>,
    },
    Send {
        connect_id: ConnectId,
        data: Vec<u8>,
        timeout: Duration,
        reply: Reply<bool>,
    },
    Receive {
        connect_id: ConnectId,
        max_len: usize,
        timeout: Duration,
        reply: Reply<Option<Vec<u8>>>,
    },
    Close {
        connect_id: ConnectId,
        timeout: Duration,
        reply: Reply<bool>,
    },
    IsOpen {
        connect_id: ConnectId,
        reply: Reply<bool>,
    },
    State {
        reply: Reply<ModemState>,
    },
}

/// What a [`ModemHandle`] puts in the worker's mailbox.
enum Message<T> {
    Call(Request),
    /// Stop the worker and hand the modem back.
    Shutdown { reply: oneshot::Sender<Modem<T>> },
}

/// Cloneable front end to a modem worker.
///
/// Requests are queued in a mailbox and executed strictly one after another,
/// so callers on different tasks never interleave AT exchanges.
pub struct ModemHandle<T> {
    tx: mpsc::Sender<Message<T>>,
    current: Arc<Mutex<CancellationToken>>,
    config: Arc<ModemConfig>,
}

impl<T> Clone for ModemHandle<T> {
    fn clone(&self) -> Self {
        ModemHandle {
            tx: self.tx.clone(),
            current: Arc::clone(&self.current),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T> std::fmt::Debug for ModemHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemHandle")
            .field("name", &self.config.name)
            .finish_non_exhaustive()
    }
}

/// Spawn the worker. The returned join handle completes when the worker
/// stops, either after [`ModemHandle::shutdown`] or once every handle has
/// been dropped.
pub fn spawn_modem_worker<T>(modem: Modem<T>) -> (ModemHandle<T>, JoinHandle<()>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
    let current = Arc::new(Mutex::new(modem.cancellation_token()));
    let config = Arc::new(modem.config().clone());
    let task = tokio::spawn(worker_loop(modem, rx, Arc::clone(&current)));
    (ModemHandle { tx, current, config }, task)
}

async fn worker_loop<T>(
    mut modem: Modem<T>,
    mut rx: mpsc::Receiver<Message<T>>,
    current: Arc<Mutex<CancellationToken>>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some(message) = rx.recv().await {
        if modem.cancellation_token().is_cancelled() {
            let fresh = CancellationToken::new();
            if let Ok(mut slot) = current.lock() {
                *slot = fresh.clone();
            }
            modem.set_cancellation_token(fresh);
        }
        match message {
            Message::Call(request) => handle_request(&mut modem, request).await,
            Message::Shutdown { reply } => {
                debug!(modem = %modem.config().name, "worker shutdown requested");
                let _ = reply.send(modem);
                return;
            }
        }
    }
    debug!(modem = %modem.config().name, "all handles dropped, worker exiting");
}

async fn handle_request<T>(modem: &mut Modem<T>, request: Request)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match request {
        Request::Initialize { reply } => {
            let _ = reply.send(modem.initialize().await);
        }
        Request::SupplyPower { on, reply } => {
            let _ = reply.send(modem.supply_power(on));
        }
        Request::TurnOnOrReset { reply } => {
            let _ = reply.send(modem.turn_on_or_reset().await);
        }
        Request::Activate {
            access_point,
            user,
            password,
            timeout,
            reply,
        } => {
            let result = modem.activate(&access_point, &user, &password, timeout).await;
            let _ = reply.send(result);
        }
        Request::Ping { reply } => {
            let _ = reply.send(modem.ping().await);
        }
        Request::Imei { reply } => {
            let _ = reply.send(modem.imei().await);
        }
        Request::Imsi { reply } => {
            let _ = reply.send(modem.imsi().await);
        }
        Request::PhoneNumber { reply } => {
            let _ = reply.send(modem.phone_number().await);
        }
        Request::SignalQuality { reply } => {
            let _ = reply.send(modem.signal_quality().await);
        }
        Request::LocalAddress { reply } => {
            let _ = reply.send(modem.local_address().await);
        }
        Request::Resolve {
            host,
            timeout,
            reply,
        } => {
            let _ = reply.send(modem.resolve(&host, timeout).await);
        }
        Request::Open {
            host,
            port,
            socket_type,
            timeout,
            reply,
        } => {
            let _ = reply.send(modem.open(&host, port, socket_type, timeout).await);
        }
        Request::Send {
            connect_id,
            data,
            timeout,
            reply,
        } => {
            let _ = reply.send(modem.send(connect_id, &data, timeout).await);
        }
        Request::Receive {
            connect_id,
            max_len,
            timeout,
            reply,
        } => {
            let mut buffer = vec![0u8; max_len.min(MAX_SOCKET_DATA_SIZE)];
            let received = modem.receive(connect_id, &mut buffer, timeout).await;
            let result = received.map(|length| {
                length.map(|n| {
                    buffer.truncate(n);
                    buffer
                })
            });
            let _ = reply.send(result);
        }
        Request::Close {
            connect_id,
            timeout,
            reply,
        } => {
            let _ = reply.send(modem.close(connect_id, timeout).await);
        }
        Request::IsOpen { connect_id, reply } => {
            modem.process_urcs();
            let _ = reply.send(Ok(modem.is_open(connect_id)));
        }
        Request::State { reply } => {
            let _ = reply.send(Ok(modem.state()));
        }
    }
}

impl<T> ModemHandle<T> {
    /// Configuration of the modem behind this handle.
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Abort the wait in progress. The request being served fails the way
    /// a timeout would; queued requests run normally.
    pub fn cancel(&self) {
        if let Ok(token) = self.current.lock() {
            token.cancel();
        }
    }

    async fn call<R>(&self, build: impl FnOnce(Reply<R>) -> Request) -> ModemResult<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::Call(build(reply_tx)))
            .await
            .map_err(|_| ModemError::WorkerStopped)?;
        reply_rx.await.map_err(|_| ModemError::WorkerStopped)?
    }

    pub async fn initialize(&self) -> ModemResult<()> {
        self.call(|reply| Request::Initialize { reply }).await
    }

    pub async fn supply_power(&self, on: bool) -> ModemResult<()> {
        self.call(|reply| Request::SupplyPower { on, reply }).await
    }

    pub async fn turn_on_or_reset(&self) -> ModemResult<bool> {
        self.call(|reply| Request::TurnOnOrReset { reply }).await
    }

    pub async fn activate(
        &self,
        access_point: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> ModemResult<bool> {
        self.call(|reply| Request::Activate {
            access_point: access_point.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            timeout,
            reply,
        })
        .await
    }

    pub async fn ping(&self) -> ModemResult<bool> {
        self.call(|reply| Request::Ping { reply }).await
    }

    pub async fn imei(&self) -> ModemResult<Option<String>> {
        self.call(|reply| Request::Imei { reply }).await
    }

    pub async fn imsi(&self) -> ModemResult<Option<String>> {
        self.call(|reply| Request::Imsi { reply }).await
    }

    pub async fn phone_number(&self) -> ModemResult<Option<String>> {
        self.call(|reply| Request::PhoneNumber { reply }).await
    }

    pub async fn signal_quality(&self) -> ModemResult<Option<SignalQuality>> {
        self.call(|reply| Request::SignalQuality { reply }).await
    }

    pub async fn local_address(&self) -> ModemResult<Option<String>> {
        self.call(|reply| Request::LocalAddress { reply }).await
    }

    pub async fn resolve(&self, host: &str, timeout: Duration) -> ModemResult<Vec<String>> {
        self.call(|reply| Request::Resolve {
            host: host.to_string(),
            timeout,
            reply,
        })
        .await
    }

    pub async fn open(
        &self,
        host: &str,
        port: u16,
        socket_type: SocketType,
        timeout: Duration,
    ) -> ModemResult<ConnectId> {
        self.call(|reply| Request::Open {
            host: host.to_string(),
            port,
            socket_type,
            timeout,
            reply,
        })
        .await
    }

    pub async fn send(
        &self,
        connect_id: ConnectId,
        data: &[u8],
        timeout: Duration,
    ) -> ModemResult<bool> {
        self.call(|reply| Request::Send {
            connect_id,
            data: data.to_vec(),
            timeout,
            reply,
        })
        .await
    }

    /// Fetch up to `max_len` buffered bytes, at most one module read
    /// ([`MAX_SOCKET_DATA_SIZE`]). `None` as for [`Modem::receive`].
    pub async fn receive(
        &self,
        connect_id: ConnectId,
        max_len: usize,
        timeout: Duration,
    ) -> ModemResult<Option<Vec<u8>>> {
        self.call(|reply| Request::Receive {
            connect_id,
            max_len,
            timeout,
            reply,
        })
        .await
    }

    pub async fn close(&self, connect_id: ConnectId, timeout: Duration) -> ModemResult<bool> {
        self.call(|reply| Request::Close {
            connect_id,
            timeout,
            reply,
        })
        .await
    }

    pub async fn is_open(&self, connect_id: ConnectId) -> ModemResult<bool> {
        self.call(|reply| Request::IsOpen { connect_id, reply }).await
    }

    pub async fn state(&self) -> ModemResult<ModemState> {
        self.call(|reply| Request::State { reply }).await
    }

    /// Stop the worker once the requests queued before this one have run,
    /// and get the modem back.
    pub async fn shutdown(&self) -> ModemResult<Modem<T>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| ModemError::WorkerStopped)?;
        reply_rx.await.map_err(|_| ModemError::WorkerStopped)
    }
}
