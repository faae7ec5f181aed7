//! Commands that can be sent to the EC21 module.
//!
//! The engine only needs a small slice of the EC21 command set:
//! - Handshake and power management (`ATE0`, `AT+QURCCFG`, `AT+QSCLK`)
//! - SIM and network registration queries
//! - PDP context configuration and activation
//! - TCP/IP socket commands (`AT+QIOPEN`, `AT+QISEND`, `AT+QIRD`, ...)
//! - Identity and signal queries

use crate::codec::LineFramer;

/// Maximum number of simultaneous socket connections (`connectID` 0..=11).
pub const MAX_CONNECTIONS: u8 = 12;

/// Maximum payload for a single `AT+QISEND` / `AT+QIRD` exchange.
pub const MAX_SOCKET_DATA_SIZE: usize = 1460;

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// TCP client connection.
    Tcp,
    /// UDP client "connection".
    Udp,
}

impl SocketType {
    /// The service type string used by `AT+QIOPEN`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketType::Tcp => "TCP",
            SocketType::Udp => "UDP",
        }
    }
}

impl std::fmt::Display for SocketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication method for a PDP context (`AT+QICSGP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authentication {
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

impl Authentication {
    /// Numeric code used on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Authentication::None => 0,
            Authentication::Pap => 1,
            Authentication::Chap => 2,
            Authentication::PapOrChap => 3,
        }
    }
}

/// Commands understood by the EC21.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ========== Basic Commands ==========
    /// Liveness check (`AT`).
    Attention,

    /// Disable command echo (`ATE0`).
    EchoOff,

    /// Route URCs to the given port (`AT+QURCCFG="urcport",...`).
    UrcPort {
        /// Port name, e.g. `uart1`.
        port: String,
    },

    /// Configure UART sleep clock mode (`AT+QSCLK=<n>`).
    SleepClock {
        /// Whether the module may enter sleep when DTR is high.
        enabled: bool,
    },

    // ========== SIM / Network ==========
    /// Query SIM PIN state (`AT+CPIN?`).
    SimStatus,

    /// Query GPRS (packet domain) registration (`AT+CGREG?`).
    GprsRegistration,

    /// Query EPS (LTE) registration (`AT+CEREG?`).
    EpsRegistration,

    /// Configure a TCP/IP context (`AT+QICSGP`).
    ConfigureContext {
        /// Context id (1-16).
        context_id: u8,
        /// Access point name.
        apn: String,
        /// APN user name.
        user: String,
        /// APN password.
        password: String,
        /// Authentication method.
        auth: Authentication,
    },

    /// Activate a PDP context (`AT+QIACT=<ctx>`).
    ActivateContext {
        /// Context id.
        context_id: u8,
    },

    /// Query activated contexts (`AT+QIACT?`).
    QueryContexts,

    // ========== Sockets ==========
    /// List socket states (`AT+QISTATE?`).
    SocketState,

    /// Open a socket (`AT+QIOPEN`), buffer access mode.
    OpenSocket {
        /// Context id.
        context_id: u8,
        /// Connection id to use.
        connect_id: u8,
        /// TCP or UDP.
        socket_type: SocketType,
        /// Remote host name or IP address.
        host: String,
        /// Remote port.
        port: u16,
    },

    /// Announce a payload of `length` bytes (`AT+QISEND`).
    SendData {
        /// Connection id.
        connect_id: u8,
        /// Payload length in bytes.
        length: usize,
    },

    /// Read up to `length` buffered bytes (`AT+QIRD`).
    ReadData {
        /// Connection id.
        connect_id: u8,
        /// Maximum number of bytes to read.
        length: usize,
    },

    /// Close a socket (`AT+QICLOSE`).
    CloseSocket {
        /// Connection id.
        connect_id: u8,
    },

    /// Resolve a host name (`AT+QIDNSGIP`). Results arrive as URCs.
    ResolveHost {
        /// Context id.
        context_id: u8,
        /// Host name to resolve.
        host: String,
    },

    // ========== Identity ==========
    /// Product serial number / IMEI (`AT+GSN`).
    Imei,

    /// International mobile subscriber identity (`AT+CIMI`).
    Imsi,

    /// Subscriber number (`AT+CNUM`).
    SubscriberNumber,

    /// Signal quality (`AT+CSQ`).
    SignalQuality,

}

impl Command {
    /// Encode the command as a line to send to the module.
    /// Returns the bytes to send (including the `\r` terminator).
    pub fn encode(&self) -> Vec<u8> {
        let cmd_str = self.to_command_string();
        LineFramer::encode_command(&cmd_str)
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Attention => "AT".to_string(),
            Command::EchoOff => "ATE0".to_string(),
            Command::UrcPort { port } => format!("AT+QURCCFG=\"urcport\",\"{}\"", port),
            Command::SleepClock { enabled } => format!("AT+QSCLK={}", u8::from(*enabled)),

            Command::SimStatus => "AT+CPIN?".to_string(),
            Command::GprsRegistration => "AT+CGREG?".to_string(),
            Command::EpsRegistration => "AT+CEREG?".to_string(),
            Command::ConfigureContext {
                context_id,
                apn,
                user,
                password,
                auth,
            } => format!(
                "AT+QICSGP={},1,\"{}\",\"{}\",\"{}\",{}",
                context_id,
                apn,
                user,
                password,
                auth.code()
            ),
            Command::ActivateContext { context_id } => format!("AT+QIACT={}", context_id),
            Command::QueryContexts => "AT+QIACT?".to_string(),

            Command::SocketState => "AT+QISTATE?".to_string(),
            Command::OpenSocket {
                context_id,
                connect_id,
                socket_type,
                host,
                port,
            } => format!(
                "AT+QIOPEN={},{},\"{}\",\"{}\",{},0,0",
                context_id, connect_id, socket_type, host, port
            ),
            Command::SendData { connect_id, length } => {
                format!("AT+QISEND={},{}", connect_id, length)
            }
            Command::ReadData { connect_id, length } => {
                format!("AT+QIRD={},{}", connect_id, length)
            }
            Command::CloseSocket { connect_id } => format!("AT+QICLOSE={}", connect_id),
            Command::ResolveHost { context_id, host } => {
                format!("AT+QIDNSGIP={},\"{}\"", context_id, host)
            }

            Command::Imei => "AT+GSN".to_string(),
            Command::Imsi => "AT+CIMI".to_string(),
            Command::SubscriberNumber => "AT+CNUM".to_string(),
            Command::SignalQuality => "AT+CSQ".to_string(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_command_string())
    }
}
