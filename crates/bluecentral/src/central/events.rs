use crate::gap::{ConnectionParams, TypedAddress};
use crate::gatt::{CharacteristicFound, DescriptorFound, GattStatus, PrimaryServiceFound};
use crate::link::ConnectionId;
use crate::store::SecurityKeys;
use crate::timer::TimerId;

/// How a pairing attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingResult {
    Success { authenticated: bool },
    /// The peer lost the keys we hold for it.
    KeyMissing,
    Failed(u8),
}

/// Everything the link stack and the timer service report to the central.
#[derive(Debug, Clone)]
pub enum CentralEvent {
    AdvertisingReport {
        address: TypedAddress,
        rssi: i8,
        data: Vec<u8>,
    },
    ConnectionComplete {
        address: TypedAddress,
        /// HCI status, `HCI_SUCCESS` on success
        status: u8,
        conn: ConnectionId,
        link_handle: u16,
        params: ConnectionParams,
    },
    CancelConnectConfirm,
    PrimaryServiceFound {
        conn: ConnectionId,
        found: PrimaryServiceFound,
    },
    PrimaryDiscoveryComplete {
        conn: ConnectionId,
        status: GattStatus,
    },
    CharacteristicFound {
        conn: ConnectionId,
        found: CharacteristicFound,
    },
    CharacteristicDiscoveryComplete {
        conn: ConnectionId,
        status: GattStatus,
    },
    DescriptorFound {
        conn: ConnectionId,
        found: DescriptorFound,
    },
    DescriptorDiscoveryComplete {
        conn: ConnectionId,
        status: GattStatus,
    },
    ReadConfirm {
        conn: ConnectionId,
        handle: u16,
        status: GattStatus,
        value: Vec<u8>,
    },
    WriteConfirm {
        conn: ConnectionId,
        handle: u16,
        status: GattStatus,
    },
    /// Notification or indication; indications are acknowledged by the link.
    Notification {
        conn: ConnectionId,
        handle: u16,
        value: Vec<u8>,
        indication: bool,
    },
    /// The link needs the stored keys to encrypt.
    KeyRequest {
        conn: ConnectionId,
    },
    KeysDistributed {
        conn: ConnectionId,
        keys: SecurityKeys,
    },
    PairingComplete {
        conn: ConnectionId,
        result: PairingResult,
    },
    ConnectionParamUpdateConfirm {
        conn: ConnectionId,
        status: u8,
        params: ConnectionParams,
    },
    DisconnectComplete {
        conn: ConnectionId,
        reason: u8,
    },
    TimerExpired(TimerId),
}
