//! Error types for the bluecentral library
//!
//! This module defines the crate-wide error type. Errors raised by the link
//! collaborator and the bond store have their own enums and convert into
//! [`CentralError`] with `?`.

use crate::gatt::types::Uuid;
use crate::link::{ConnectionId, LinkError};
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur while driving the central role
#[derive(Error, Debug)]
pub enum CentralError {
    #[error("Link request failed: {0}")]
    Link(#[from] LinkError),

    #[error("Bond store error: {0}")]
    Store(#[from] StoreError),

    /// An event arrived that the current state cannot account for.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("No device slot owns connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Invalid device slot: {0}")]
    InvalidSlot(usize),

    #[error("A {0} request is already outstanding")]
    Busy(&'static str),

    #[error("Service registry is full ({0} entries)")]
    RegistryFull(usize),

    #[error("Service {0} is already registered")]
    DuplicateService(Uuid),

    #[error("Device slot {0} is not connected")]
    NotConnected(usize),
}

impl CentralError {
    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        CentralError::ProtocolViolation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CentralError>;
