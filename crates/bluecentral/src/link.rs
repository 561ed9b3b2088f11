//! Interface to the BLE link stack
//!
//! Every request is asynchronous: a successful return only means the stack
//! accepted it. Results come back later as [`CentralEvent`]s.
//!
//! [`CentralEvent`]: crate::central::CentralEvent

use crate::gap::{ConnectionParams, TypedAddress};
use crate::gatt::types::{HandleRange, Uuid};
use crate::store::SecurityKeys;
use std::fmt;
use thiserror::Error;

/// GATT connection identifier assigned by the link stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u16);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Errors a link stack reports when it refuses a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Link stack busy")]
    Busy,

    #[error("Connection {0} is not open")]
    NotConnected(ConnectionId),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Unsupported operation")]
    Unsupported,
}

/// Which advertisers a scan should report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// Report every connectable advertiser
    Any,
    /// Report advertisers listing at least one of these service UUIDs
    Services(Vec<Uuid>),
}

pub trait LinkLayer {
    fn discover_primary_by_uuid(&mut self, conn: ConnectionId, uuid: Uuid) -> Result<(), LinkError>;

    fn discover_characteristics(
        &mut self,
        conn: ConnectionId,
        range: HandleRange,
    ) -> Result<(), LinkError>;

    fn discover_descriptors(&mut self, conn: ConnectionId, range: HandleRange)
        -> Result<(), LinkError>;

    fn read_attribute(&mut self, conn: ConnectionId, handle: u16) -> Result<(), LinkError>;

    fn write_attribute(
        &mut self,
        conn: ConnectionId,
        handle: u16,
        value: &[u8],
    ) -> Result<(), LinkError>;

    fn connect(&mut self, address: TypedAddress) -> Result<(), LinkError>;

    fn cancel_connect(&mut self) -> Result<(), LinkError>;

    fn disconnect(&mut self, conn: ConnectionId) -> Result<(), LinkError>;

    fn scan_start(&mut self, filter: &ScanFilter) -> Result<(), LinkError>;

    fn scan_stop(&mut self) -> Result<(), LinkError>;

    /// Ask the peer to start pairing, or to encrypt with existing keys.
    fn request_security(&mut self, conn: ConnectionId) -> Result<(), LinkError>;

    /// Answer the stack's request for stored keys. `None` forces pairing.
    fn key_request_response(
        &mut self,
        conn: ConnectionId,
        keys: Option<&SecurityKeys>,
    ) -> Result<(), LinkError>;

    fn update_connection_params(
        &mut self,
        conn: ConnectionId,
        params: &ConnectionParams,
    ) -> Result<(), LinkError>;
}
