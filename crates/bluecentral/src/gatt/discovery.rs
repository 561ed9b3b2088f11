//! Discovery engine
//!
//! Walks the registry in three passes per peer: primary services by UUID,
//! then characteristics of each found service, then the descriptors after
//! each characteristic. Exactly one discovery request is in flight at a
//! time; every confirmation advances the walk by one step.

use super::context::GattContext;
use super::events::{CharacteristicFound, DescriptorFound, PrimaryServiceFound};
use super::registry::ServiceId;
use super::session::{DiscoveryPhase, DiscoveryRequest, DiscoverySession};
use super::status::GattStatus;
use super::types::{HandleKind, HandleRange};
use crate::error::{CentralError, Result};
use log::{debug, info, warn};

/// Where the walk stands after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A discovery request is in flight.
    Pending,
    /// A service issued its own request from `on_discovery_complete`.
    ServiceProcedure(ServiceId),
    /// Every found service is discovered; configuration can start.
    Complete,
    /// A mandatory service is absent on the peer.
    MandatoryMissing(ServiceId),
    /// The peer has none of the registered services.
    NothingFound,
    /// The link failed a discovery procedure.
    Failed(GattStatus),
}

/// Begin primary service discovery from the first registered service.
pub fn start(ctx: &mut GattContext<'_>) -> Result<DiscoveryOutcome> {
    *ctx.session = DiscoverySession {
        phase: DiscoveryPhase::Primary,
        ..DiscoverySession::default()
    };
    debug!("{}: starting discovery of {} services", ctx.slot, ctx.registry.len());
    next_primary(ctx)
}

fn issue(ctx: &mut GattContext<'_>, request: DiscoveryRequest, range: HandleRange) -> Result<()> {
    ctx.tracker.begin_discovery(request)?;
    let result = match request {
        DiscoveryRequest::Primary(id) => {
            let uuid = ctx.registry.get(id).uuid();
            ctx.link.discover_primary_by_uuid(ctx.conn, uuid)
        }
        DiscoveryRequest::Characteristics(_) => ctx.link.discover_characteristics(ctx.conn, range),
        DiscoveryRequest::Descriptors(_) => ctx.link.discover_descriptors(ctx.conn, range),
    };
    if let Err(err) = result {
        ctx.tracker.finish_discovery();
        return Err(err.into());
    }
    Ok(())
}

fn expect_request(
    ctx: &GattContext<'_>,
    what: &str,
    matches: impl Fn(DiscoveryRequest) -> Option<ServiceId>,
) -> Result<ServiceId> {
    ctx.tracker.discovery().and_then(matches).ok_or_else(|| {
        CentralError::violation(format!(
            "{}: {} while {:?} is outstanding",
            ctx.slot,
            what,
            ctx.tracker.discovery()
        ))
    })
}

fn primary(request: DiscoveryRequest) -> Option<ServiceId> {
    match request {
        DiscoveryRequest::Primary(id) => Some(id),
        _ => None,
    }
}

fn characteristics(request: DiscoveryRequest) -> Option<ServiceId> {
    match request {
        DiscoveryRequest::Characteristics(id) => Some(id),
        _ => None,
    }
}

fn descriptors(request: DiscoveryRequest) -> Option<ServiceId> {
    match request {
        DiscoveryRequest::Descriptors(id) => Some(id),
        _ => None,
    }
}

fn next_primary(ctx: &mut GattContext<'_>) -> Result<DiscoveryOutcome> {
    while let Some(id) = ctx.registry.id_at(ctx.session.current_service_index) {
        if ctx.registry.get(id).found(ctx.slot) {
            ctx.session.current_service_index += 1;
            continue;
        }
        if ctx.discovered.len() >= ctx.max_services {
            debug!("{}: per-device service limit {} reached", ctx.slot, ctx.max_services);
            break;
        }
        debug!(
            "{}: discovering primary service {}",
            ctx.slot,
            ctx.registry.get(id).uuid()
        );
        issue(ctx, DiscoveryRequest::Primary(id), HandleRange::default())?;
        return Ok(DiscoveryOutcome::Pending);
    }

    ctx.session.current_service_index = 0;
    if ctx.discovered.is_empty() {
        warn!("{}: peer has no supported service", ctx.slot);
        return Ok(DiscoveryOutcome::NothingFound);
    }
    begin_service(ctx)
}

/// A primary service instance reported by the peer. Returns the service
/// when it was newly found.
pub fn on_primary_found(
    ctx: &mut GattContext<'_>,
    found: &PrimaryServiceFound,
) -> Result<Option<ServiceId>> {
    let id = expect_request(ctx, "primary service indication", primary)?;
    let slot = ctx.slot;
    let service = ctx.registry.get_mut(id);

    if found.uuid != service.uuid() {
        return Err(CentralError::violation(format!(
            "{}: primary service {} reported while discovering {}",
            slot,
            found.uuid,
            service.uuid()
        )));
    }
    if found.range.is_empty() {
        debug!("{}: ignoring {} with empty range {}", slot, found.uuid, found.range);
        return Ok(None);
    }
    if service.found(slot) {
        debug!("{}: ignoring second instance of {} at {}", slot, found.uuid, found.range);
        return Ok(None);
    }

    service.init(slot, found);
    info!("{}: found {} at {}", slot, service.name(), found.range);
    ctx.discovered.push(id);
    Ok(Some(id))
}

pub fn on_primary_complete(
    ctx: &mut GattContext<'_>,
    status: GattStatus,
) -> Result<DiscoveryOutcome> {
    let id = expect_request(ctx, "primary discovery confirmation", primary)?;
    ctx.tracker.finish_discovery();

    if !status.is_success_or_empty() {
        warn!("{}: primary discovery failed: {}", ctx.slot, status);
        return Ok(DiscoveryOutcome::Failed(status));
    }

    let service = ctx.registry.get(id);
    if service.is_mandatory() && !service.found(ctx.slot) {
        warn!("{}: mandatory {} missing", ctx.slot, service.name());
        return Ok(DiscoveryOutcome::MandatoryMissing(id));
    }

    ctx.session.current_service_index += 1;
    next_primary(ctx)
}

/// Start characteristic discovery for the service under the cursor,
/// skipping services without a usable range.
fn begin_service(ctx: &mut GattContext<'_>) -> Result<DiscoveryOutcome> {
    loop {
        let Some(id) = ctx.current_service() else {
            ctx.session.current_service_index = 0;
            ctx.session.phase = DiscoveryPhase::Complete;
            info!("{}: discovery complete, {} services", ctx.slot, ctx.discovered.len());
            return Ok(DiscoveryOutcome::Complete);
        };

        let query = ctx.registry.get_mut(id).get_handles(ctx.slot, HandleKind::Service);
        if query.range.is_empty() {
            debug!("{}: skipping {} with no handles", ctx.slot, id);
            ctx.session.current_service_index += 1;
            continue;
        }

        ctx.session.phase = DiscoveryPhase::Characteristics;
        ctx.session.current_characteristic_index = 0;
        ctx.session.service_end = query.range.end;
        debug!("{}: discovering characteristics in {}", ctx.slot, query.range);
        issue(ctx, DiscoveryRequest::Characteristics(id), query.range)?;
        return Ok(DiscoveryOutcome::Pending);
    }
}

pub fn on_characteristic_found(
    ctx: &mut GattContext<'_>,
    found: &CharacteristicFound,
) -> Result<()> {
    let id = expect_request(ctx, "characteristic indication", characteristics)?;
    if !ctx.registry.get_mut(id).on_characteristic_found(ctx.slot, found) {
        debug!(
            "{}: ignoring characteristic {} at 0x{:04x}",
            ctx.slot, found.uuid, found.value_handle
        );
    }
    Ok(())
}

pub fn on_characteristics_complete(
    ctx: &mut GattContext<'_>,
    status: GattStatus,
) -> Result<DiscoveryOutcome> {
    let id = expect_request(ctx, "characteristic discovery confirmation", characteristics)?;
    ctx.tracker.finish_discovery();

    if !status.is_success_or_empty() {
        warn!("{}: characteristic discovery failed: {}", ctx.slot, status);
        return Ok(DiscoveryOutcome::Failed(status));
    }

    ctx.session.phase = DiscoveryPhase::Descriptors;
    next_descriptors(ctx, id)
}

fn next_descriptors(ctx: &mut GattContext<'_>, id: ServiceId) -> Result<DiscoveryOutcome> {
    loop {
        let query = ctx
            .registry
            .get_mut(id)
            .get_handles(ctx.slot, HandleKind::Characteristic);
        if !query.more || query.range.start > ctx.session.service_end {
            break;
        }
        ctx.session.current_characteristic_index += 1;
        if query.range.is_empty() {
            continue;
        }

        let range = HandleRange::new(query.range.start, query.range.end.min(ctx.session.service_end));
        debug!("{}: discovering descriptors in {}", ctx.slot, range);
        issue(ctx, DiscoveryRequest::Descriptors(id), range)?;
        return Ok(DiscoveryOutcome::Pending);
    }
    finish_service(ctx, id)
}

pub fn on_descriptor_found(ctx: &mut GattContext<'_>, found: &DescriptorFound) -> Result<()> {
    let id = expect_request(ctx, "descriptor indication", descriptors)?;
    ctx.registry.get_mut(id).on_descriptor_found(ctx.slot, found);
    Ok(())
}

pub fn on_descriptors_complete(
    ctx: &mut GattContext<'_>,
    status: GattStatus,
) -> Result<DiscoveryOutcome> {
    let id = expect_request(ctx, "descriptor discovery confirmation", descriptors)?;
    ctx.tracker.finish_discovery();

    if !status.is_success_or_empty() {
        warn!("{}: descriptor discovery failed: {}", ctx.slot, status);
        return Ok(DiscoveryOutcome::Failed(status));
    }
    next_descriptors(ctx, id)
}

fn finish_service(ctx: &mut GattContext<'_>, id: ServiceId) -> Result<DiscoveryOutcome> {
    let slot = ctx.slot;
    let issued = {
        let (service, mut requester) = ctx.service_with_requester(id);
        service.on_discovery_complete(slot, &mut requester)?
    };

    if issued {
        if !ctx.tracker.has_pending_access() {
            return Err(CentralError::violation(format!(
                "{}: {} claimed a request but issued none",
                slot, id
            )));
        }
        debug!("{}: {} waiting on its own procedure", slot, id);
        ctx.session.service_incomplete = true;
        return Ok(DiscoveryOutcome::ServiceProcedure(id));
    }

    ctx.session.current_service_index += 1;
    begin_service(ctx)
}

/// Continue with the next service once a service-initiated procedure has
/// been confirmed.
pub fn resume(ctx: &mut GattContext<'_>) -> Result<DiscoveryOutcome> {
    if !ctx.session.service_incomplete {
        return Err(CentralError::violation(format!(
            "{}: discovery resumed without a service procedure",
            ctx.slot
        )));
    }
    ctx.session.service_incomplete = false;
    ctx.session.current_service_index += 1;
    begin_service(ctx)
}
