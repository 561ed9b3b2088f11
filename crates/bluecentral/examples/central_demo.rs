use bluecentral::gap::HCI_LOCAL_HOST_TERMINATED;
use bluecentral::gatt::{
    AttErrorCode, CharacteristicFound, CharacteristicProperties, DescriptorFound,
    PrimaryServiceFound,
};
use bluecentral::services::DeviceInfoField;
use bluecentral::{
    BatteryService, BdAddr, Central, CentralConfig, CentralEvent, ConnectionId, ConnectionParams,
    ConnectionState, DeviceInfoService, DeviceSlot, GattStatus, HandleRange, LinkError, LinkLayer,
    MemoryStore, ScanFilter, SecurityKeys, SimulatedTimers, TypedAddress, Uuid,
};
use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;

const CONN: ConnectionId = ConnectionId(0x0001);

struct Characteristic {
    uuid: u16,
    declaration: u16,
    properties: CharacteristicProperties,
    cccd: Option<u16>,
    value: Vec<u8>,
}

struct Service {
    uuid: u16,
    range: HandleRange,
    characteristics: Vec<Characteristic>,
}

/// A peripheral simulated in memory. Every accepted request queues the
/// events a real link stack would report back.
struct SimulatedPeripheral {
    address: TypedAddress,
    services: Vec<Service>,
    events: VecDeque<CentralEvent>,
    advertised: bool,
}

impl SimulatedPeripheral {
    fn new(address: TypedAddress) -> Self {
        let read_notify = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
        let read = CharacteristicProperties::READ;
        Self {
            address,
            services: vec![
                Service {
                    uuid: 0x180F,
                    range: HandleRange::new(0x0001, 0x0004),
                    characteristics: vec![Characteristic {
                        uuid: 0x2A19,
                        declaration: 0x0002,
                        properties: read_notify,
                        cccd: Some(0x0004),
                        value: vec![88],
                    }],
                },
                Service {
                    uuid: 0x180A,
                    range: HandleRange::new(0x0005, 0x0009),
                    characteristics: vec![
                        Characteristic {
                            uuid: 0x2A29,
                            declaration: 0x0006,
                            properties: read,
                            cccd: None,
                            value: b"Acme Sensors".to_vec(),
                        },
                        Characteristic {
                            uuid: 0x2A24,
                            declaration: 0x0008,
                            properties: read,
                            cccd: None,
                            value: b"BT-100".to_vec(),
                        },
                    ],
                },
            ],
            events: VecDeque::new(),
            advertised: false,
        }
    }

    fn next_event(&mut self) -> Option<CentralEvent> {
        self.events.pop_front()
    }

    fn value(&self, handle: u16) -> Option<&[u8]> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.declaration + 1 == handle)
            .map(|c| c.value.as_slice())
    }
}

impl LinkLayer for SimulatedPeripheral {
    fn discover_primary_by_uuid(&mut self, conn: ConnectionId, uuid: Uuid) -> Result<(), LinkError> {
        let mut status = GattStatus::Att(AttErrorCode::AttributeNotFound);
        for service in self.services.iter().filter(|s| Uuid::Uuid16(s.uuid) == uuid) {
            self.events.push_back(CentralEvent::PrimaryServiceFound {
                conn,
                found: PrimaryServiceFound {
                    uuid,
                    range: service.range,
                },
            });
            status = GattStatus::Success;
        }
        self.events
            .push_back(CentralEvent::PrimaryDiscoveryComplete { conn, status });
        Ok(())
    }

    fn discover_characteristics(&mut self, conn: ConnectionId, range: HandleRange) -> Result<(), LinkError> {
        for service in &self.services {
            for c in service
                .characteristics
                .iter()
                .filter(|c| range.contains(c.declaration))
            {
                self.events.push_back(CentralEvent::CharacteristicFound {
                    conn,
                    found: CharacteristicFound {
                        uuid: Uuid::Uuid16(c.uuid),
                        declaration_handle: c.declaration,
                        value_handle: c.declaration + 1,
                        properties: c.properties,
                    },
                });
            }
        }
        self.events.push_back(CentralEvent::CharacteristicDiscoveryComplete {
            conn,
            status: GattStatus::Success,
        });
        Ok(())
    }

    fn discover_descriptors(&mut self, conn: ConnectionId, range: HandleRange) -> Result<(), LinkError> {
        let cccds: Vec<u16> = self
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .filter_map(|c| c.cccd)
            .filter(|&handle| range.contains(handle))
            .collect();
        for handle in cccds {
            self.events.push_back(CentralEvent::DescriptorFound {
                conn,
                found: DescriptorFound {
                    uuid: Uuid::Uuid16(0x2902),
                    handle,
                },
            });
        }
        self.events.push_back(CentralEvent::DescriptorDiscoveryComplete {
            conn,
            status: GattStatus::Success,
        });
        Ok(())
    }

    fn read_attribute(&mut self, conn: ConnectionId, handle: u16) -> Result<(), LinkError> {
        let (status, value) = match self.value(handle) {
            Some(value) => (GattStatus::Success, value.to_vec()),
            None => (GattStatus::Att(AttErrorCode::InvalidHandle), Vec::new()),
        };
        self.events.push_back(CentralEvent::ReadConfirm {
            conn,
            handle,
            status,
            value,
        });
        Ok(())
    }

    fn write_attribute(&mut self, conn: ConnectionId, handle: u16, value: &[u8]) -> Result<(), LinkError> {
        println!("  peripheral: write 0x{:04x} <- {:02x?}", handle, value);
        self.events.push_back(CentralEvent::WriteConfirm {
            conn,
            handle,
            status: GattStatus::Success,
        });
        Ok(())
    }

    fn connect(&mut self, address: TypedAddress) -> Result<(), LinkError> {
        if address != self.address {
            return Err(LinkError::Rejected(format!("no peripheral at {}", address)));
        }
        self.events.push_back(CentralEvent::ConnectionComplete {
            address,
            status: 0x00,
            conn: CONN,
            link_handle: 0x0040,
            params: ConnectionParams {
                interval_min: 0x0018,
                interval_max: 0x0028,
                latency: 0,
                supervision_timeout: 0x01F4,
            },
        });
        Ok(())
    }

    fn cancel_connect(&mut self) -> Result<(), LinkError> {
        self.events.push_back(CentralEvent::CancelConnectConfirm);
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) -> Result<(), LinkError> {
        self.events.push_back(CentralEvent::DisconnectComplete {
            conn,
            reason: HCI_LOCAL_HOST_TERMINATED,
        });
        Ok(())
    }

    fn scan_start(&mut self, filter: &ScanFilter) -> Result<(), LinkError> {
        println!("  peripheral: scan started with {:?}", filter);
        if !self.advertised {
            self.advertised = true;
            self.events.push_back(CentralEvent::AdvertisingReport {
                address: self.address,
                rssi: -52,
                // Flags, then the battery service UUID
                data: vec![0x02, 0x01, 0x06, 0x03, 0x03, 0x0F, 0x18],
            });
        }
        Ok(())
    }

    fn scan_stop(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn request_security(&mut self, _conn: ConnectionId) -> Result<(), LinkError> {
        Ok(())
    }

    fn key_request_response(&mut self, _conn: ConnectionId, _keys: Option<&SecurityKeys>) -> Result<(), LinkError> {
        Ok(())
    }

    fn update_connection_params(&mut self, conn: ConnectionId, params: &ConnectionParams) -> Result<(), LinkError> {
        self.events.push_back(CentralEvent::ConnectionParamUpdateConfirm {
            conn,
            status: 0x00,
            params: *params,
        });
        Ok(())
    }
}

type DemoCentral = Central<SimulatedPeripheral, SimulatedTimers, MemoryStore>;

/// Feed queued link events and expired timers back into the central.
fn pump(central: &mut DemoCentral, step: Duration) -> Result<(), Box<dyn std::error::Error>> {
    while let Some(event) = central.link_mut().next_event() {
        central.handle_event(event)?;
    }
    for id in central.timers_mut().advance(step) {
        central.handle_event(CentralEvent::TimerExpired(id))?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let address = TypedAddress::public(BdAddr::from_str("C0:FF:EE:00:11:22")?);
    let config = CentralConfig::default();
    let store = MemoryStore::new(256);
    let mut central = Central::new(config, SimulatedPeripheral::new(address), SimulatedTimers::new(), store)?;

    central.register_service(Box::new(BatteryService::new().with_listener(|slot, level| {
        println!("{}: battery at {}%", slot, level);
    })))?;
    central.register_service(Box::new(DeviceInfoService::new().with_listener(
        |slot, field, value| match field {
            DeviceInfoField::ManufacturerName | DeviceInfoField::ModelNumber => {
                println!("{}: {:?} is {}", slot, field, String::from_utf8_lossy(value))
            }
            _ => println!("{}: {:?} is {:02x?}", slot, field, value),
        },
    )))?;

    println!("Starting central...");
    central.start()?;

    let slot = DeviceSlot(0);
    for _ in 0..50 {
        pump(&mut central, Duration::from_millis(50))?;
        let device = central.device(slot).ok_or("missing device slot")?;
        if device.state == ConnectionState::Configured && device.queue.is_empty() {
            break;
        }
    }
    println!("Device state: {:?}", central.state(slot));

    // The peripheral pushes a new level
    central.handle_event(CentralEvent::Notification {
        conn: CONN,
        handle: 0x0003,
        value: vec![71],
        indication: false,
    })?;

    println!("Disconnecting...");
    central.disconnect(slot)?;
    pump(&mut central, Duration::ZERO)?;
    println!("Device state: {:?}", central.state(slot));

    Ok(())
}
