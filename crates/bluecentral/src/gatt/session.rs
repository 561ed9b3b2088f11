//! Per-device discovery cursors and outstanding-request bookkeeping

use super::registry::ServiceId;
use crate::error::{CentralError, Result};

/// Where the discovery walk currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPhase {
    #[default]
    Idle,
    Primary,
    Characteristics,
    Descriptors,
    Complete,
}

/// Cursors for one device's discovery and configuration.
///
/// During primary discovery `current_service_index` walks the registry.
/// Afterwards it walks the device's discovered services, and it is back at
/// zero once the walk completes.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySession {
    pub phase: DiscoveryPhase,
    pub current_service_index: usize,
    pub current_characteristic_index: usize,
    /// A service issued its own read or write from `on_discovery_complete`.
    pub service_incomplete: bool,
    pub config_in_progress: bool,
    /// Last handle of the service whose descriptors are being discovered.
    pub service_end: u16,
}

impl DiscoverySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, DiscoveryPhase::Idle | DiscoveryPhase::Complete)
            || self.service_incomplete
            || self.config_in_progress
    }
}

/// The one discovery request a device may have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRequest {
    Primary(ServiceId),
    Characteristics(ServiceId),
    Descriptors(ServiceId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOp {
    Read,
    Write(Vec<u8>),
}

impl AttributeOp {
    fn name(&self) -> &'static str {
        match self {
            AttributeOp::Read => "read",
            AttributeOp::Write(_) => "write",
        }
    }
}

/// A read or write the link has accepted but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outstanding {
    /// Service to deliver the confirmation to, if any.
    pub owner: Option<ServiceId>,
    pub handle: u16,
    pub op: AttributeOp,
    /// Issued from the device's procedure queue.
    pub queued: bool,
}

/// Enforces at most one discovery request, one read and one write per
/// device. A request rejected for lack of security is parked in `suspended`
/// until pairing finishes, and nothing else may be issued meanwhile.
#[derive(Debug, Clone, Default)]
pub struct ProcedureTracker {
    discovery: Option<DiscoveryRequest>,
    read: Option<Outstanding>,
    write: Option<Outstanding>,
    suspended: Option<Outstanding>,
}

impl ProcedureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_discovery(&mut self, request: DiscoveryRequest) -> Result<()> {
        if self.discovery.is_some() {
            return Err(CentralError::Busy("discovery"));
        }
        self.discovery = Some(request);
        Ok(())
    }

    pub fn discovery(&self) -> Option<DiscoveryRequest> {
        self.discovery
    }

    pub fn finish_discovery(&mut self) -> Option<DiscoveryRequest> {
        self.discovery.take()
    }

    /// Fails with `Busy` if `op` cannot be issued right now.
    pub fn ensure_free(&self, op: &AttributeOp) -> Result<()> {
        if self.suspended.is_some() {
            return Err(CentralError::Busy("suspended"));
        }
        let slot = match op {
            AttributeOp::Read => &self.read,
            AttributeOp::Write(_) => &self.write,
        };
        match slot {
            Some(_) => Err(CentralError::Busy(op.name())),
            None => Ok(()),
        }
    }

    pub(crate) fn record(&mut self, request: Outstanding) {
        match request.op {
            AttributeOp::Read => self.read = Some(request),
            AttributeOp::Write(_) => self.write = Some(request),
        }
    }

    pub fn read(&self) -> Option<&Outstanding> {
        self.read.as_ref()
    }

    pub fn write(&self) -> Option<&Outstanding> {
        self.write.as_ref()
    }

    pub fn take_read(&mut self) -> Option<Outstanding> {
        self.read.take()
    }

    pub fn take_write(&mut self) -> Option<Outstanding> {
        self.write.take()
    }

    pub fn suspend(&mut self, request: Outstanding) {
        self.suspended = Some(request);
    }

    pub fn suspended(&self) -> Option<&Outstanding> {
        self.suspended.as_ref()
    }

    pub fn take_suspended(&mut self) -> Option<Outstanding> {
        self.suspended.take()
    }

    pub fn has_pending_access(&self) -> bool {
        self.read.is_some() || self.write.is_some() || self.suspended.is_some()
    }
}
