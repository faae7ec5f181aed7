//! Response parsing for the EC21.
//!
//! Responses are whole lines produced by [`LineFramer`](crate::LineFramer)
//! (no CR/LF). They can be:
//! - Final result codes: `OK`, `ERROR`, `+CME ERROR: <n>`, `SEND OK`, ...
//! - Information lines: `+CSQ: 20,99`, `+QIOPEN: 3,0`, `+QIRD: 5`, ...
//! - Unsolicited result codes: `+QIURC: "closed",3`, ...

use crate::error::{AtError, AtResult};

/// Final success result.
pub const OK: &[u8] = b"OK";

/// Generic final error result.
pub const ERROR: &[u8] = b"ERROR";

/// Prefix of an extended mobile equipment error.
pub const CME_ERROR: &[u8] = b"+CME ERROR:";

/// Prefix of an extended message service error.
pub const CMS_ERROR: &[u8] = b"+CMS ERROR:";

/// Line sent by the module once it has booted.
pub const READY: &[u8] = b"RDY";

/// Final result of a successful `AT+QISEND`.
pub const SEND_OK: &[u8] = b"SEND OK";

/// Final result of a failed `AT+QISEND`.
pub const SEND_FAIL: &[u8] = b"SEND FAIL";

/// Prompt sent after `AT+QISEND` before raw payload bytes are accepted.
pub const SEND_PROMPT: &[u8] = b"> ";

/// Prefix of the TCP/IP unsolicited result codes.
pub const URC_PREFIX: &[u8] = b"+QIURC: ";

/// Prefix of the `AT+QIOPEN` completion line.
pub const OPEN_PREFIX: &[u8] = b"+QIOPEN: ";

/// Prefix of a socket listing line.
pub const STATE_PREFIX: &[u8] = b"+QISTATE: ";

/// Prefix of the `AT+QIRD` header line.
pub const READ_PREFIX: &[u8] = b"+QIRD: ";

/// Prefix of the `AT+CSQ` reply.
pub const CSQ_PREFIX: &[u8] = b"+CSQ: ";

/// Prefix of the `AT+CNUM` reply.
pub const CNUM_PREFIX: &[u8] = b"+CNUM: ";

/// Prefix of the `AT+QIACT?` reply.
pub const CONTEXT_PREFIX: &[u8] = b"+QIACT: ";

/// Whether `line` is an error final result (`ERROR`, `+CME ERROR`, `+CMS ERROR`).
pub fn is_error_result(line: &[u8]) -> bool {
    line == ERROR || line.starts_with(CME_ERROR) || line.starts_with(CMS_ERROR)
}

/// Whether `line` terminates an ordinary command (success or error).
pub fn is_final_result(line: &[u8]) -> bool {
    line == OK || is_error_result(line)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// Strip `prefix` from `line` and return the remainder as text.
fn body<'a>(line: &'a [u8], prefix: &'static [u8]) -> AtResult<&'a str> {
    let rest = line.strip_prefix(prefix).ok_or_else(|| AtError::UnexpectedLine {
        expected: prefix_name(prefix),
        line: lossy(line),
    })?;
    std::str::from_utf8(rest).map_err(|_| AtError::InvalidField {
        field: "utf-8 text",
        line: lossy(line),
    })
}

fn prefix_name(prefix: &'static [u8]) -> &'static str {
    std::str::from_utf8(prefix).unwrap_or("<binary prefix>")
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

fn field<T: std::str::FromStr>(
    fields: &[&str],
    index: usize,
    name: &'static str,
    line: &[u8],
) -> AtResult<T> {
    let raw = fields.get(index).ok_or_else(|| AtError::MissingField {
        field: name,
        line: lossy(line),
    })?;
    unquote(raw).parse().map_err(|_| AtError::InvalidField {
        field: name,
        line: lossy(line),
    })
}

// ============================================================================
// Registration
// ============================================================================

/// Which registration domain a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationDomain {
    /// Packet-switched GPRS domain (`AT+CGREG?`).
    Gprs,
    /// EPS / LTE domain (`AT+CEREG?`).
    Eps,
}

impl RegistrationDomain {
    /// Prefix of the query reply line.
    pub fn prefix(&self) -> &'static [u8] {
        match self {
            RegistrationDomain::Gprs => b"+CGREG: ",
            RegistrationDomain::Eps => b"+CEREG: ",
        }
    }
}

impl std::fmt::Display for RegistrationDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationDomain::Gprs => write!(f, "GPRS"),
            RegistrationDomain::Eps => write!(f, "EPS"),
        }
    }
}

/// Network registration status (`<stat>` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// 0: not registered, not searching.
    NotSearching,
    /// 1: registered, home network.
    RegisteredHome,
    /// 2: not registered, searching.
    Searching,
    /// 3: registration denied.
    Denied,
    /// 4: unknown.
    Unknown,
    /// 5: registered, roaming.
    RegisteredRoaming,
    /// Any other code.
    Other(u8),
}

impl RegistrationStatus {
    /// Map a `<stat>` code to a status.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RegistrationStatus::NotSearching,
            1 => RegistrationStatus::RegisteredHome,
            2 => RegistrationStatus::Searching,
            3 => RegistrationStatus::Denied,
            4 => RegistrationStatus::Unknown,
            5 => RegistrationStatus::RegisteredRoaming,
            other => RegistrationStatus::Other(other),
        }
    }

    /// The `<stat>` code.
    pub fn code(&self) -> u8 {
        match self {
            RegistrationStatus::NotSearching => 0,
            RegistrationStatus::RegisteredHome => 1,
            RegistrationStatus::Searching => 2,
            RegistrationStatus::Denied => 3,
            RegistrationStatus::Unknown => 4,
            RegistrationStatus::RegisteredRoaming => 5,
            RegistrationStatus::Other(code) => *code,
        }
    }

    /// Registered on the home network or roaming.
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::RegisteredHome | RegistrationStatus::RegisteredRoaming
        )
    }

    /// The module has given up: polling further will not help.
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::NotSearching | RegistrationStatus::Unknown
        )
    }

    /// Parse a `+CGREG: <n>,<stat>[,...]` or `+CEREG: ...` line.
    pub fn parse(line: &[u8], domain: RegistrationDomain) -> AtResult<Self> {
        let text = body(line, domain.prefix())?;
        let fields: Vec<&str> = text.split(',').collect();
        let code: u8 = field(&fields, 1, "registration status", line)?;
        Ok(RegistrationStatus::from_code(code))
    }
}

// ============================================================================
// Sockets
// ============================================================================

/// Completion of `AT+QIOPEN`: `+QIOPEN: <connectID>,<err>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenResult {
    /// Connection id the result refers to.
    pub connect_id: u8,
    /// 0 on success, otherwise a Quectel TCP/IP error code.
    pub error_code: u16,
}

impl OpenResult {
    /// Parse a `+QIOPEN:` line.
    pub fn parse(line: &[u8]) -> AtResult<Self> {
        let text = body(line, OPEN_PREFIX)?;
        let fields: Vec<&str> = text.split(',').collect();
        Ok(OpenResult {
            connect_id: field(&fields, 0, "connect id", line)?,
            error_code: field(&fields, 1, "error code", line)?,
        })
    }

    /// Whether the socket was opened.
    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }
}

/// One line of the `AT+QISTATE?` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketStatus {
    /// Connection id in use on the module.
    pub connect_id: u8,
    /// Service type, e.g. `TCP`.
    pub service_type: String,
    /// Remote address.
    pub remote_address: String,
    /// Remote port, if reported.
    pub remote_port: Option<u16>,
    /// Socket state code, if reported (2 = connected, 4 = closing).
    pub socket_state: Option<u8>,
}

impl SocketStatus {
    /// Parse `+QISTATE: <connectID>,"<type>","<ip>",<rport>,<lport>,<state>,...`.
    ///
    /// Only the connection id is mandatory.
    pub fn parse(line: &[u8]) -> AtResult<Self> {
        let text = body(line, STATE_PREFIX)?;
        let fields: Vec<&str> = text.split(',').collect();
        Ok(SocketStatus {
            connect_id: field(&fields, 0, "connect id", line)?,
            service_type: fields.get(1).map(|f| unquote(f).to_string()).unwrap_or_default(),
            remote_address: fields.get(2).map(|f| unquote(f).to_string()).unwrap_or_default(),
            remote_port: fields.get(3).and_then(|f| unquote(f).parse().ok()),
            socket_state: fields.get(5).and_then(|f| unquote(f).parse().ok()),
        })
    }
}

/// Parse the length announced by `+QIRD: <read_actual_length>[,...]`.
pub fn parse_read_length(line: &[u8]) -> AtResult<usize> {
    let text = body(line, READ_PREFIX)?;
    let fields: Vec<&str> = text.split(',').collect();
    field(&fields, 0, "read length", line)
}

// ============================================================================
// Identity / Signal / Context
// ============================================================================

/// Signal quality from `+CSQ: <rssi>,<ber>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    /// RSSI index: 0-31, or 99 when unknown.
    pub rssi: u8,
    /// Bit error rate index: 0-7, or 99 when unknown.
    pub ber: u8,
}

impl SignalQuality {
    /// Parse a `+CSQ:` line.
    pub fn parse(line: &[u8]) -> AtResult<Self> {
        let text = body(line, CSQ_PREFIX)?;
        let fields: Vec<&str> = text.split(',').collect();
        Ok(SignalQuality {
            rssi: field(&fields, 0, "rssi", line)?,
            ber: field(&fields, 1, "ber", line)?,
        })
    }

    /// Received signal strength in dBm, `None` when unknown.
    pub fn dbm(&self) -> Option<i16> {
        match self.rssi {
            0..=31 => Some(-113 + 2 * i16::from(self.rssi)),
            _ => None,
        }
    }
}

/// Extract the number from `+CNUM: [<alpha>],"<number>",<type>`.
pub fn parse_subscriber_number(line: &[u8]) -> AtResult<String> {
    let text = body(line, CNUM_PREFIX)?;
    let fields: Vec<&str> = text.split(',').collect();
    let number = fields.get(1).map(|f| unquote(f)).unwrap_or_else(|| unquote(text));
    Ok(number.to_string())
}

/// An activated context from `+QIACT: <ctx>,<state>,<type>,"<address>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextState {
    /// Context id.
    pub context_id: u8,
    /// 1 when activated.
    pub state: u8,
    /// 1 = IPv4, 2 = IPv6.
    pub context_type: u8,
    /// Local address assigned by the network.
    pub address: String,
}

impl ContextState {
    /// Parse a `+QIACT:` line.
    pub fn parse(line: &[u8]) -> AtResult<Self> {
        let text = body(line, CONTEXT_PREFIX)?;
        let fields: Vec<&str> = text.split(',').collect();
        Ok(ContextState {
            context_id: field(&fields, 0, "context id", line)?,
            state: field(&fields, 1, "context state", line)?,
            context_type: field(&fields, 2, "context type", line)?,
            address: fields.get(3).map(|f| unquote(f).to_string()).unwrap_or_default(),
        })
    }
}

// ============================================================================
// Unsolicited Result Codes
// ============================================================================

/// A recognised `+QIURC:` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urc {
    /// The peer or the network closed a connection: `+QIURC: "closed",<id>`.
    SocketClosed {
        /// Connection id.
        connect_id: u8,
    },
    /// Data is waiting in the receive buffer: `+QIURC: "recv",<id>`.
    DataReceived {
        /// Connection id.
        connect_id: u8,
    },
    /// The network deactivated a context: `+QIURC: "pdpdeact",<ctx>`.
    ContextDeactivated {
        /// Context id.
        context_id: u8,
    },
    /// Header of a DNS result: `+QIURC: "dnsgip",<err>,<count>,<ttl>`.
    DnsHeader {
        /// 0 on success.
        error_code: u16,
        /// Number of address lines that follow.
        count: usize,
        /// Cache lifetime in seconds.
        ttl: u32,
    },
    /// One resolved address: `+QIURC: "dnsgip","<ip>"`.
    DnsAddress {
        /// IP address text.
        address: String,
    },
}

impl Urc {
    /// Parse a line as a URC. Returns `None` for ordinary lines and for
    /// `+QIURC:` kinds that are not recognised.
    pub fn parse(line: &[u8]) -> Option<Urc> {
        let text = std::str::from_utf8(line.strip_prefix(URC_PREFIX)?).ok()?;
        let fields: Vec<&str> = text.split(',').collect();
        let kind = unquote(fields.first()?);
        let urc = match kind {
            "closed" => Urc::SocketClosed {
                connect_id: field(&fields, 1, "connect id", line).ok()?,
            },
            "recv" => Urc::DataReceived {
                connect_id: field(&fields, 1, "connect id", line).ok()?,
            },
            "pdpdeact" => Urc::ContextDeactivated {
                context_id: field(&fields, 1, "context id", line).ok()?,
            },
            "dnsgip" if fields.len() >= 4 => Urc::DnsHeader {
                error_code: field(&fields, 1, "dns error", line).ok()?,
                count: field(&fields, 2, "address count", line).ok()?,
                ttl: field(&fields, 3, "ttl", line).ok()?,
            },
            "dnsgip" if fields.len() == 2 && fields[1].trim().starts_with('"') => {
                Urc::DnsAddress {
                    address: unquote(fields[1]).to_string(),
                }
            }
            // A bare error code (`+QIURC: "dnsgip",565`) is a failed lookup.
            "dnsgip" if fields.len() == 2 => Urc::DnsHeader {
                error_code: field(&fields, 1, "dns error", line).ok()?,
                count: 0,
                ttl: 0,
            },
            _ => {
                log::debug!("unrecognised URC kind {:?}", kind);
                return None;
            }
        };
        Some(urc)
    }

    /// The URC kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Urc::SocketClosed { .. } => "closed",
            Urc::DataReceived { .. } => "recv",
            Urc::ContextDeactivated { .. } => "pdpdeact",
            Urc::DnsHeader { .. } | Urc::DnsAddress { .. } => "dnsgip",
        }
    }
}
