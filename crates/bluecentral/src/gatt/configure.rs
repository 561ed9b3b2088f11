//! Configuration engine
//!
//! After discovery each found service is configured in discovery order.
//! `configure` is called until it returns false; a true return means a
//! write is outstanding and the next step waits for its confirmation.

use super::context::GattContext;
use super::registry::ServiceId;
use crate::error::{CentralError, Result};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// The service issued a configuration write.
    Pending(ServiceId),
    /// Every service is configured.
    Complete,
}

pub fn start(ctx: &mut GattContext<'_>) -> Result<ConfigOutcome> {
    ctx.session.config_in_progress = true;
    ctx.session.current_service_index = 0;
    step(ctx)
}

/// Run configuration steps until one issues a write or all services are
/// done.
pub fn step(ctx: &mut GattContext<'_>) -> Result<ConfigOutcome> {
    if ctx.tracker.has_pending_access() {
        return Err(CentralError::violation(format!(
            "{}: configuration step while a request is outstanding",
            ctx.slot
        )));
    }

    let slot = ctx.slot;
    while let Some(id) = ctx.current_service() {
        let more = {
            let (service, mut requester) = ctx.service_with_requester(id);
            service.configure(slot, &mut requester)?
        };

        if more {
            if !ctx.tracker.has_pending_access() {
                return Err(CentralError::violation(format!(
                    "{}: {} asked to wait but issued no write",
                    slot,
                    ctx.registry.get(id).name()
                )));
            }
            return Ok(ConfigOutcome::Pending(id));
        }

        debug!("{}: {} configured", slot, ctx.registry.get(id).name());
        ctx.session.current_service_index += 1;
    }

    ctx.session.config_in_progress = false;
    ctx.session.current_service_index = 0;
    Ok(ConfigOutcome::Complete)
}
