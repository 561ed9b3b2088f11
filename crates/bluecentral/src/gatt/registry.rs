//! Ordered, fixed-capacity table of supported services

use super::service::ServiceDescriptor;
use super::types::{DeviceSlot, Uuid};
use crate::error::{CentralError, Result};
use std::fmt;

/// Position of a descriptor in the [`ServiceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub(crate) usize);

impl ServiceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service#{}", self.0)
    }
}

/// Registration order is discovery order.
pub struct ServiceRegistry {
    services: Vec<Box<dyn ServiceDescriptor>>,
    capacity: usize,
}

impl ServiceRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            services: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn register(&mut self, service: Box<dyn ServiceDescriptor>) -> Result<ServiceId> {
        if self.services.len() >= self.capacity {
            return Err(CentralError::RegistryFull(self.capacity));
        }
        let uuid = service.uuid();
        if self.find_by_uuid(&uuid).is_some() {
            return Err(CentralError::DuplicateService(uuid));
        }
        self.services.push(service);
        Ok(ServiceId(self.services.len() - 1))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids in registration order. Only ids handed out by this registry are
    /// accepted by `get`/`get_mut`.
    pub fn ids(&self) -> impl Iterator<Item = ServiceId> {
        (0..self.services.len()).map(ServiceId)
    }

    pub fn id_at(&self, index: usize) -> Option<ServiceId> {
        (index < self.services.len()).then_some(ServiceId(index))
    }

    pub fn get(&self, id: ServiceId) -> &dyn ServiceDescriptor {
        self.services[id.0].as_ref()
    }

    pub fn get_mut(&mut self, id: ServiceId) -> &mut dyn ServiceDescriptor {
        self.services[id.0].as_mut()
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<ServiceId> {
        self.services
            .iter()
            .position(|s| s.uuid() == *uuid)
            .map(ServiceId)
    }

    pub fn uuids(&self) -> Vec<Uuid> {
        self.services.iter().map(|s| s.uuid()).collect()
    }

    /// True if any advertised UUID belongs to a registered service.
    pub fn matches_any(&self, advertised: &[Uuid]) -> bool {
        advertised.iter().any(|uuid| self.find_by_uuid(uuid).is_some())
    }

    /// Drop everything every service knows about `slot`.
    pub fn reset_device(&mut self, slot: DeviceSlot) {
        for service in self.services.iter_mut() {
            service.reset(slot);
        }
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.services.iter().map(|s| s.name()))
            .finish()
    }
}
