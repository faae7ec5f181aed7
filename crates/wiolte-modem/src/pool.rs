//! Connection id bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use wiolte_at::{SocketStatus, SocketType, MAX_CONNECTIONS, STATE_PREFIX};

use crate::error::{ModemError, ModemResult};

/// Socket connection id (`connectID`), 0..=11 on the EC21.
pub type ConnectId = u8;

/// The set of connection ids this host has opened and not yet seen closed.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    open: BTreeMap<ConnectId, SocketType>,
    max: u8,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CONNECTIONS)
    }

    /// A pool handing out ids `0..max`.
    pub fn with_capacity(max: u8) -> Self {
        ConnectionPool {
            open: BTreeMap::new(),
            max,
        }
    }

    pub fn capacity(&self) -> u8 {
        self.max
    }

    /// Lowest id that is neither open locally nor in `live`.
    pub fn allocate(&self, live: &BTreeSet<ConnectId>) -> ModemResult<ConnectId> {
        (0..self.max)
            .find(|id| !self.open.contains_key(id) && !live.contains(id))
            .ok_or(ModemError::ResourceExhausted { max: self.max })
    }

    /// Record `connect_id` as open.
    pub fn insert(&mut self, connect_id: ConnectId, socket_type: SocketType) {
        self.open.insert(connect_id, socket_type);
    }

    /// Forget `connect_id`. Returns whether it was open.
    pub fn release(&mut self, connect_id: ConnectId) -> bool {
        self.open.remove(&connect_id).is_some()
    }

    pub fn is_open(&self, connect_id: ConnectId) -> bool {
        self.open.contains_key(&connect_id)
    }

    pub fn socket_type(&self, connect_id: ConnectId) -> Option<SocketType> {
        self.open.get(&connect_id).copied()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Forget every connection, e.g. after the module rebooted.
    pub fn clear(&mut self) {
        self.open.clear();
    }
}

/// Connection ids the module reports in an `AT+QISTATE?` listing. Lines
/// that are not `+QISTATE:` lines are skipped.
pub fn live_connect_ids(lines: &[Bytes]) -> ModemResult<BTreeSet<ConnectId>> {
    let mut live = BTreeSet::new();
    for line in lines.iter().filter(|line| line.starts_with(STATE_PREFIX)) {
        live.insert(SocketStatus::parse(line)?.connect_id);
    }
    Ok(live)
}
