//! Central configuration

use crate::gap::ConnectionParams;
use crate::store::EvictionPolicy;
use std::time::Duration;

/// Default number of simultaneously tracked peers
pub const DEFAULT_MAX_DEVICES: usize = 1;
/// Default number of bond table slots
pub const DEFAULT_MAX_BONDED_DEVICES: usize = 1;
/// Default service registry capacity
pub const DEFAULT_MAX_SERVICES: usize = 10;
/// Default number of services tracked per connected peer
pub const DEFAULT_MAX_SERVICES_PER_DEVICE: usize = 5;

/// Configuration for a [`Central`](crate::central::Central)
#[derive(Debug, Clone)]
pub struct CentralConfig {
    /// Device slots, each able to hold one connection
    pub max_devices: usize,
    /// Slots in the bond table
    pub max_bonded_devices: usize,
    /// Capacity of the service registry
    pub max_services: usize,
    /// Services recorded per device during primary discovery
    pub max_services_per_device: usize,
    /// Settle delay between connection and the start of discovery
    pub discovery_start_delay: Duration,
    /// Delay before asking an unbonded peer to pair
    pub bonding_chance_delay: Duration,
    /// How long a connection attempt may stay pending
    pub connect_timeout: Duration,
    /// Pair on demand when the peer rejects a request for lack of security
    pub pairing_support: bool,
    /// Only connect to advertisers listing a registered service
    pub filter_by_service: bool,
    /// What to do with a new bond when the table is full
    pub eviction_policy: EvictionPolicy,
    /// Parameters requested once a device is configured
    pub preferred_params: ConnectionParams,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            max_bonded_devices: DEFAULT_MAX_BONDED_DEVICES,
            max_services: DEFAULT_MAX_SERVICES,
            max_services_per_device: DEFAULT_MAX_SERVICES_PER_DEVICE,
            discovery_start_delay: Duration::from_millis(300),
            bonding_chance_delay: Duration::from_millis(150),
            connect_timeout: Duration::from_secs(15),
            pairing_support: true,
            filter_by_service: true,
            eviction_policy: EvictionPolicy::OverwriteLast,
            preferred_params: ConnectionParams::default(),
        }
    }
}
