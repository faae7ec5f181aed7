//! Quectel EC21 AT Protocol
//!
//! This crate provides types and utilities for talking to a Quectel EC21 LTE
//! module over its UART AT-command interface. It is transport-agnostic and
//! synchronous: bytes go in, lines and typed values come out. The async engine
//! that owns the UART lives in `wiolte-modem`.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → module): ASCII text terminated with `\r`
//! - **Responses** (module → host): `\r\n<body>\r\n`, usually preceded by an
//!   extra empty `\r\n` pair
//! - **URCs** (module → host): unsolicited lines such as
//!   `+QIURC: "closed",3`, interleaved with command responses
//! - **Prompt**: after `AT+QISEND` the module sends the bare bytes `> ` and
//!   then accepts raw payload bytes
//!
//! # Example
//!
//! ```rust,ignore
//! use wiolte_at::{Command, LineFramer, Urc};
//!
//! let frame = Command::SocketState.encode();
//!
//! let mut framer = LineFramer::new(1024);
//! for &byte in b"\r\n+QIURC: \"closed\",3\r\n" {
//!     if let Some(line) = framer.feed(byte) {
//!         assert!(Urc::parse(&line).is_some());
//!     }
//! }
//! ```

mod codec;
mod commands;
mod error;
mod responses;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use responses::*;
