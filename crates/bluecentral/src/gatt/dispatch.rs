//! Event dispatcher
//!
//! Routes notifications by handle and read/write confirmations to the
//! service that caused them, then tells the caller how to continue.

use super::configure::{self, ConfigOutcome};
use super::context::GattContext;
use super::discovery::{self, DiscoveryOutcome};
use super::registry::{ServiceId, ServiceRegistry};
use super::service::ServiceDescriptor;
use super::session::{AttributeOp, Outstanding};
use super::status::GattStatus;
use super::types::DeviceSlot;
use crate::error::{CentralError, Result};
use log::{debug, info, trace, warn};

/// What the central should do after a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Discovery continued after a service procedure.
    Discovery(DiscoveryOutcome),
    /// Configuration stepped after a write.
    Configuration(ConfigOutcome),
    /// A read or write outside discovery and configuration finished, or
    /// failed and was skipped.
    Completed { queued: bool },
    /// The peer wants more security; the request is parked until pairing
    /// completes.
    SecurityRequired,
    /// A configuration write failed.
    Fatal(GattStatus),
}

/// Deliver a notification or indication to the service owning `handle`.
pub fn on_notification(
    registry: &mut ServiceRegistry,
    discovered: &[ServiceId],
    slot: DeviceSlot,
    handle: u16,
    value: &[u8],
) -> Option<ServiceId> {
    trace!("{}: notification 0x{:04x} {}", slot, handle, hex::encode(value));
    let owner = discovered.iter().copied().find(|&id| {
        let service = registry.get(id);
        service.found(slot) && service.handle_in_range(slot, handle)
    });
    match owner {
        Some(id) => registry.get_mut(id).on_notify(slot, handle, value),
        None => debug!("{}: no service owns handle 0x{:04x}", slot, handle),
    }
    owner
}

pub fn on_read_confirm(
    ctx: &mut GattContext<'_>,
    handle: u16,
    status: GattStatus,
    value: &[u8],
) -> Result<ConfirmOutcome> {
    let request = ctx.tracker.take_read().ok_or_else(|| {
        CentralError::violation(format!(
            "{}: read confirmation for 0x{:04x} with no read outstanding",
            ctx.slot, handle
        ))
    })?;
    confirm(ctx, request, handle, status, value)
}

pub fn on_write_confirm(
    ctx: &mut GattContext<'_>,
    handle: u16,
    status: GattStatus,
) -> Result<ConfirmOutcome> {
    let request = ctx.tracker.take_write().ok_or_else(|| {
        CentralError::violation(format!(
            "{}: write confirmation for 0x{:04x} with no write outstanding",
            ctx.slot, handle
        ))
    })?;
    confirm(ctx, request, handle, status, &[])
}

fn confirm(
    ctx: &mut GattContext<'_>,
    request: Outstanding,
    handle: u16,
    status: GattStatus,
    value: &[u8],
) -> Result<ConfirmOutcome> {
    if request.handle != handle {
        return Err(CentralError::violation(format!(
            "{}: confirmation for 0x{:04x} but 0x{:04x} is outstanding",
            ctx.slot, handle, request.handle
        )));
    }

    if status.is_security_failure() {
        info!("{}: 0x{:04x} rejected ({}), pairing required", ctx.slot, handle, status);
        ctx.tracker.suspend(request);
        return Ok(ConfirmOutcome::SecurityRequired);
    }

    if ctx.session.service_incomplete {
        let id = current(ctx)?;
        if status.is_success() {
            deliver(ctx.registry.get_mut(id), ctx.slot, &request, value);
        } else {
            warn!("{}: {} procedure on 0x{:04x} failed: {}", ctx.slot, id, handle, status);
        }
        return Ok(ConfirmOutcome::Discovery(discovery::resume(ctx)?));
    }

    if ctx.session.config_in_progress {
        let id = current(ctx)?;
        if !status.is_success() {
            warn!("{}: configuration of 0x{:04x} failed: {}", ctx.slot, handle, status);
            return Ok(ConfirmOutcome::Fatal(status));
        }
        deliver(ctx.registry.get_mut(id), ctx.slot, &request, value);
        return Ok(ConfirmOutcome::Configuration(configure::step(ctx)?));
    }

    if status.is_success() {
        if let Some(owner) = request.owner {
            deliver(ctx.registry.get_mut(owner), ctx.slot, &request, value);
        }
    } else {
        warn!("{}: request on 0x{:04x} failed: {}, skipping", ctx.slot, handle, status);
    }
    Ok(ConfirmOutcome::Completed {
        queued: request.queued,
    })
}

fn current(ctx: &GattContext<'_>) -> Result<ServiceId> {
    ctx.current_service().ok_or_else(|| {
        CentralError::violation(format!(
            "{}: service index {} is past the discovered services",
            ctx.slot, ctx.session.current_service_index
        ))
    })
}

fn deliver(
    service: &mut dyn ServiceDescriptor,
    slot: DeviceSlot,
    request: &Outstanding,
    value: &[u8],
) {
    match request.op {
        AttributeOp::Read => service.on_read_confirm(slot, request.handle, value),
        AttributeOp::Write(_) => service.on_write_confirm(slot, request.handle),
    }
}
