//! Per-device records

use crate::gap::{ConnectionParams, TypedAddress};
use crate::gatt::session::{AttributeOp, Outstanding};
use crate::gatt::{DiscoverySession, ProcedureTracker, ServiceId};
use crate::link::ConnectionId;
use crate::store::SecurityKeys;
use crate::timer::TimerId;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Init,
    Scanning,
    Connecting,
    Connected,
    Discovering,
    Configured,
    Disconnecting,
}

impl ConnectionState {
    /// States in which a device holds the single scan/connect/discover pipeline.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ConnectionState::Scanning
                | ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Discovering
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Discovering | ConnectionState::Configured
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Connect,
    Discovery,
    Bonding,
}

/// Timers armed on behalf of one device.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceTimers {
    pub connect: Option<TimerId>,
    pub discovery: Option<TimerId>,
    pub bonding: Option<TimerId>,
}

impl DeviceTimers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<TimerId> {
        match kind {
            TimerKind::Connect => &mut self.connect,
            TimerKind::Discovery => &mut self.discovery,
            TimerKind::Bonding => &mut self.bonding,
        }
    }

    pub fn set(&mut self, kind: TimerKind, id: TimerId) {
        *self.slot(kind) = Some(id);
    }

    pub fn take(&mut self, kind: TimerKind) -> Option<TimerId> {
        self.slot(kind).take()
    }

    /// Claim `id` if it is one of ours and still current.
    pub fn claim(&mut self, id: TimerId) -> Option<TimerKind> {
        [TimerKind::Connect, TimerKind::Discovery, TimerKind::Bonding]
            .into_iter()
            .find(|&kind| {
                let armed = self.slot(kind);
                if *armed == Some(id) {
                    *armed = None;
                    true
                } else {
                    false
                }
            })
    }
}

/// A read or write waiting its turn on a configured device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedProcedure {
    pub owner: Option<ServiceId>,
    pub handle: u16,
    pub op: AttributeOp,
}

impl QueuedProcedure {
    pub fn read(owner: Option<ServiceId>, handle: u16) -> Self {
        Self {
            owner,
            handle,
            op: AttributeOp::Read,
        }
    }

    pub fn write(owner: Option<ServiceId>, handle: u16, value: Vec<u8>) -> Self {
        Self {
            owner,
            handle,
            op: AttributeOp::Write(value),
        }
    }

    pub(crate) fn to_outstanding(&self) -> Outstanding {
        Outstanding {
            owner: self.owner,
            handle: self.handle,
            op: self.op.clone(),
            queued: true,
        }
    }
}

/// FIFO of queued reads and writes. The head is the one in flight; it is
/// only dropped by `advance`, so a request interrupted by pairing can be
/// issued again with `retry_current`.
#[derive(Debug, Clone, Default)]
pub struct ProcedureQueue {
    items: VecDeque<QueuedProcedure>,
}

impl ProcedureQueue {
    pub fn push(&mut self, item: QueuedProcedure) {
        self.items.push_back(item);
    }

    pub fn current(&self) -> Option<&QueuedProcedure> {
        self.items.front()
    }

    /// Drop the head after it completed. Returns the new head.
    pub fn advance(&mut self) -> Option<&QueuedProcedure> {
        self.items.pop_front();
        self.items.front()
    }

    /// The head again, unchanged.
    pub fn retry_current(&self) -> Option<QueuedProcedure> {
        self.items.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Everything the central tracks for one device slot.
#[derive(Debug, Clone, Default)]
pub struct DeviceRecord {
    pub state: ConnectionState,
    pub conn: Option<ConnectionId>,
    pub link_handle: Option<u16>,
    pub address: Option<TypedAddress>,
    pub bonded: bool,
    pub bond_slot: Option<usize>,
    pub keys: SecurityKeys,
    pub params: Option<ConnectionParams>,
    /// The peer lost its keys; the next distribution replaces ours.
    pub request_new_keys: bool,
    /// A request is parked until pairing completes.
    pub pairing_in_progress: bool,
    /// Services found on the peer, in discovery order.
    pub discovered_services: Vec<ServiceId>,
    pub session: DiscoverySession,
    pub tracker: ProcedureTracker,
    pub queue: ProcedureQueue,
    pub timers: DeviceTimers,
}

impl DeviceRecord {
    /// Zero everything but the state. Timers must be cancelled first.
    pub fn clear(&mut self) {
        let state = self.state;
        *self = Self::default();
        self.state = state;
    }
}
