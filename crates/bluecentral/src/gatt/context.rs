use super::registry::{ServiceId, ServiceRegistry};
use super::service::{AttributeRequester, ServiceDescriptor};
use super::session::{DiscoverySession, ProcedureTracker};
use super::types::DeviceSlot;
use crate::link::{ConnectionId, LinkLayer};

/// Everything the discovery, configuration and dispatch steps touch for one
/// connected device, borrowed for the duration of a single event.
pub struct GattContext<'a> {
    pub slot: DeviceSlot,
    pub conn: ConnectionId,
    pub link: &'a mut dyn LinkLayer,
    pub registry: &'a mut ServiceRegistry,
    pub session: &'a mut DiscoverySession,
    pub discovered: &'a mut Vec<ServiceId>,
    pub tracker: &'a mut ProcedureTracker,
    /// Services recorded per device during primary discovery
    pub max_services: usize,
}

impl<'a> GattContext<'a> {
    /// Service under `current_service_index` in the discovered list.
    pub fn current_service(&self) -> Option<ServiceId> {
        self.discovered
            .get(self.session.current_service_index)
            .copied()
    }

    /// The service together with a requester that issues on its behalf.
    pub fn service_with_requester(
        &mut self,
        id: ServiceId,
    ) -> (&mut dyn ServiceDescriptor, AttributeRequester<'_>) {
        let requester =
            AttributeRequester::new(&mut *self.link, self.conn, &mut *self.tracker, Some(id));
        (self.registry.get_mut(id), requester)
    }
}
