//! Unit tests for discovery, configuration and dispatch

use super::{
    configure, discovery, dispatch, AttErrorCode, AttributeRequester, CharacteristicFound,
    CharacteristicProperties, ConfigOutcome, ConfirmOutcome, DescriptorFound, DeviceSlot,
    DiscoveryOutcome, DiscoveryPhase, DiscoverySession, GattContext, GattStatus, HandleKind,
    HandleRange, PrimaryServiceFound, ProcedureTracker, ServiceData, ServiceId, ServiceRegistry,
    Uuid,
};
use crate::error::CentralError;
use crate::link::{ConnectionId, LinkError};
use crate::testing::{LinkRequest, MockLink, TestService};

const SLOT: DeviceSlot = DeviceSlot(0);
const CONN: ConnectionId = ConnectionId(0x0040);
const SERVICE_A: u16 = 0x1111;
const SERVICE_B: u16 = 0x2222;

/// Everything a `GattContext` borrows, owned in one place.
struct Harness {
    link: MockLink,
    registry: ServiceRegistry,
    session: DiscoverySession,
    discovered: Vec<ServiceId>,
    tracker: ProcedureTracker,
    max_services: usize,
}

impl Harness {
    fn new(services: Vec<TestService>) -> Self {
        let mut registry = ServiceRegistry::new(8);
        for service in services {
            registry.register(Box::new(service)).unwrap();
        }
        Self {
            link: MockLink::new(),
            registry,
            session: DiscoverySession::new(),
            discovered: Vec::new(),
            tracker: ProcedureTracker::new(),
            max_services: 5,
        }
    }

    fn ctx(&mut self) -> GattContext<'_> {
        GattContext {
            slot: SLOT,
            conn: CONN,
            link: &mut self.link,
            registry: &mut self.registry,
            session: &mut self.session,
            discovered: &mut self.discovered,
            tracker: &mut self.tracker,
            max_services: self.max_services,
        }
    }

    fn id(&self, uuid: u16) -> ServiceId {
        self.registry.find_by_uuid(&Uuid::Uuid16(uuid)).unwrap()
    }
}

fn primary(uuid: u16, start: u16, end: u16) -> PrimaryServiceFound {
    PrimaryServiceFound {
        uuid: Uuid::Uuid16(uuid),
        range: HandleRange::new(start, end),
    }
}

fn characteristic(uuid: u16, declaration: u16, properties: CharacteristicProperties) -> CharacteristicFound {
    CharacteristicFound {
        uuid: Uuid::Uuid16(uuid),
        declaration_handle: declaration,
        value_handle: declaration + 1,
        properties,
    }
}

/// Discover the first registered service with one characteristic whose
/// value handle is the last handle of `range`, so no descriptor pass runs.
fn discover_one(h: &mut Harness, range: HandleRange) -> DiscoveryOutcome {
    let uuid = h.registry.get(h.registry.id_at(0).unwrap()).uuid();
    discovery::start(&mut h.ctx()).unwrap();
    discovery::on_primary_found(&mut h.ctx(), &PrimaryServiceFound { uuid, range }).unwrap();
    discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap();
    let props = CharacteristicProperties::READ | CharacteristicProperties::WRITE;
    discovery::on_characteristic_found(&mut h.ctx(), &characteristic(0xAAAA, range.end - 1, props))
        .unwrap();
    discovery::on_characteristics_complete(&mut h.ctx(), GattStatus::Success).unwrap()
}

#[test]
fn test_discovery_walks_primary_characteristics_and_descriptors() {
    let a = TestService::new(SERVICE_A);
    let log = a.log();
    let mut h = Harness::new(vec![a, TestService::new(SERVICE_B)]);
    let id_a = h.id(SERVICE_A);

    assert_eq!(discovery::start(&mut h.ctx()).unwrap(), DiscoveryOutcome::Pending);
    assert_eq!(h.session.phase, DiscoveryPhase::Primary);

    let found = discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_A, 0x0001, 0x0006)).unwrap();
    assert_eq!(found, Some(id_a));
    assert_eq!(
        discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap(),
        DiscoveryOutcome::Pending
    );

    // Service B is absent
    let not_found = GattStatus::Att(AttErrorCode::AttributeNotFound);
    assert_eq!(
        discovery::on_primary_complete(&mut h.ctx(), not_found).unwrap(),
        DiscoveryOutcome::Pending
    );
    assert_eq!(h.session.phase, DiscoveryPhase::Characteristics);
    assert_eq!(h.discovered, vec![id_a]);

    let notify = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
    discovery::on_characteristic_found(&mut h.ctx(), &characteristic(0xAAAA, 0x0002, notify)).unwrap();
    discovery::on_characteristic_found(
        &mut h.ctx(),
        &characteristic(0xBBBB, 0x0005, CharacteristicProperties::READ),
    )
    .unwrap();
    assert_eq!(
        discovery::on_characteristics_complete(&mut h.ctx(), GattStatus::Success).unwrap(),
        DiscoveryOutcome::Pending
    );

    let cccd = DescriptorFound {
        uuid: Uuid::Uuid16(0x2902),
        handle: 0x0004,
    };
    discovery::on_descriptor_found(&mut h.ctx(), &cccd).unwrap();
    assert_eq!(
        discovery::on_descriptors_complete(&mut h.ctx(), GattStatus::Success).unwrap(),
        DiscoveryOutcome::Complete
    );

    assert_eq!(h.session.phase, DiscoveryPhase::Complete);
    assert_eq!(h.session.current_service_index, 0);
    assert!(h.tracker.discovery().is_none());
    assert_eq!(
        h.link.take(),
        vec![
            LinkRequest::DiscoverPrimary(CONN, Uuid::Uuid16(SERVICE_A)),
            LinkRequest::DiscoverPrimary(CONN, Uuid::Uuid16(SERVICE_B)),
            LinkRequest::DiscoverCharacteristics(CONN, HandleRange::new(0x0001, 0x0006)),
            LinkRequest::DiscoverDescriptors(CONN, HandleRange::new(0x0004, 0x0004)),
        ]
    );
    assert_eq!(log.borrow().characteristics.len(), 2);
    assert_eq!(log.borrow().descriptors, vec![cccd]);
}

#[test]
fn test_mandatory_service_missing_stops_at_its_confirm() {
    let mut h = Harness::new(vec![
        TestService::new(SERVICE_A),
        TestService::new(SERVICE_B).mandatory(),
    ]);
    let id_b = h.id(SERVICE_B);

    discovery::start(&mut h.ctx()).unwrap();
    discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_A, 0x0001, 0x0005)).unwrap();
    discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap();
    let outcome = discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap();

    assert_eq!(outcome, DiscoveryOutcome::MandatoryMissing(id_b));
    assert_eq!(
        h.link.count(|r| matches!(r, LinkRequest::DiscoverCharacteristics(..))),
        0
    );
}

#[test]
fn test_nothing_found() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A)]);
    discovery::start(&mut h.ctx()).unwrap();
    let outcome = discovery::on_primary_complete(
        &mut h.ctx(),
        GattStatus::Att(AttErrorCode::AttributeNotFound),
    )
    .unwrap();
    assert_eq!(outcome, DiscoveryOutcome::NothingFound);
}

#[test]
fn test_failed_discovery_is_reported() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A)]);
    discovery::start(&mut h.ctx()).unwrap();
    let status = GattStatus::Transport(0x0101);
    assert_eq!(
        discovery::on_primary_complete(&mut h.ctx(), status).unwrap(),
        DiscoveryOutcome::Failed(status)
    );
    assert!(h.tracker.discovery().is_none());
}

#[test]
fn test_per_device_service_limit() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A), TestService::new(SERVICE_B)]);
    h.max_services = 1;

    discovery::start(&mut h.ctx()).unwrap();
    discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_A, 0x0001, 0x0005)).unwrap();
    discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap();

    assert_eq!(h.link.count(|r| matches!(r, LinkRequest::DiscoverPrimary(..))), 1);
    assert_eq!(
        h.link.last(),
        Some(&LinkRequest::DiscoverCharacteristics(CONN, HandleRange::new(0x0001, 0x0005)))
    );
}

#[test]
fn test_second_instance_and_foreign_uuid() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A)]);
    discovery::start(&mut h.ctx()).unwrap();

    assert!(discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_A, 0x0001, 0x0005))
        .unwrap()
        .is_some());
    assert!(discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_A, 0x0010, 0x0015))
        .unwrap()
        .is_none());
    assert_eq!(h.discovered.len(), 1);

    let result = discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_B, 0x0020, 0x0025));
    assert!(matches!(result, Err(CentralError::ProtocolViolation(_))));
}

#[test]
fn test_refused_discovery_leaves_nothing_outstanding() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A)]);
    h.link.refuse_next = Some(LinkError::Busy);

    let result = discovery::start(&mut h.ctx());
    assert!(matches!(result, Err(CentralError::Link(LinkError::Busy))));
    assert!(h.tracker.discovery().is_none());
}

#[test]
fn test_configuration_waits_for_each_write() {
    let a = TestService::new(SERVICE_A).config_writes(2);
    let log = a.log();
    let mut h = Harness::new(vec![a]);
    let id_a = h.id(SERVICE_A);

    assert_eq!(discover_one(&mut h, HandleRange::new(0x0001, 0x0003)), DiscoveryOutcome::Complete);
    h.link.take();

    assert_eq!(configure::start(&mut h.ctx()).unwrap(), ConfigOutcome::Pending(id_a));
    assert_eq!(h.link.take(), vec![LinkRequest::Write(CONN, 0x0003, vec![0])]);

    let outcome = dispatch::on_write_confirm(&mut h.ctx(), 0x0003, GattStatus::Success).unwrap();
    assert_eq!(outcome, ConfirmOutcome::Configuration(ConfigOutcome::Pending(id_a)));
    assert_eq!(h.link.take(), vec![LinkRequest::Write(CONN, 0x0003, vec![1])]);

    let outcome = dispatch::on_write_confirm(&mut h.ctx(), 0x0003, GattStatus::Success).unwrap();
    assert_eq!(outcome, ConfirmOutcome::Configuration(ConfigOutcome::Complete));
    assert!(!h.session.config_in_progress);
    assert!(h.link.take().is_empty());
    assert_eq!(log.borrow().writes, vec![(SLOT, 0x0003), (SLOT, 0x0003)]);
}

#[test]
fn test_configuration_write_failure_is_fatal() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A).config_writes(1)]);
    discover_one(&mut h, HandleRange::new(0x0001, 0x0003));
    configure::start(&mut h.ctx()).unwrap();

    let status = GattStatus::Att(AttErrorCode::WriteNotPermitted);
    let outcome = dispatch::on_write_confirm(&mut h.ctx(), 0x0003, status).unwrap();
    assert_eq!(outcome, ConfirmOutcome::Fatal(status));
}

#[test]
fn test_confirmation_for_wrong_handle() {
    let mut h = Harness::new(vec![TestService::new(SERVICE_A).config_writes(1)]);
    discover_one(&mut h, HandleRange::new(0x0001, 0x0003));
    configure::start(&mut h.ctx()).unwrap();

    let result = dispatch::on_write_confirm(&mut h.ctx(), 0x0002, GattStatus::Success);
    assert!(matches!(result, Err(CentralError::ProtocolViolation(_))));

    let result = dispatch::on_read_confirm(&mut h.ctx(), 0x0003, GattStatus::Success, &[]);
    assert!(matches!(result, Err(CentralError::ProtocolViolation(_))));
}

#[test]
fn test_security_failure_suspends_and_reissue_completes_discovery() {
    let a = TestService::new(SERVICE_A).discovery_read();
    let log = a.log();
    let mut h = Harness::new(vec![a]);
    let id_a = h.id(SERVICE_A);

    assert_eq!(
        discover_one(&mut h, HandleRange::new(0x0001, 0x0003)),
        DiscoveryOutcome::ServiceProcedure(id_a)
    );
    assert_eq!(h.link.last(), Some(&LinkRequest::Read(CONN, 0x0003)));

    let rejected = GattStatus::Att(AttErrorCode::InsufficientAuthentication);
    let outcome = dispatch::on_read_confirm(&mut h.ctx(), 0x0003, rejected, &[]).unwrap();
    assert_eq!(outcome, ConfirmOutcome::SecurityRequired);
    assert_eq!(h.tracker.suspended().map(|r| r.handle), Some(0x0003));
    assert!(matches!(
        h.tracker.ensure_free(&super::session::AttributeOp::Read),
        Err(CentralError::Busy(_))
    ));

    // Pairing done: reissue the parked request
    let request = h.tracker.take_suspended().unwrap();
    AttributeRequester::new(&mut h.link, CONN, &mut h.tracker, request.owner)
        .issue(request)
        .unwrap();

    let outcome = dispatch::on_read_confirm(&mut h.ctx(), 0x0003, GattStatus::Success, &[0x42]).unwrap();
    assert_eq!(outcome, ConfirmOutcome::Discovery(DiscoveryOutcome::Complete));
    assert_eq!(h.link.count(|r| *r == LinkRequest::Read(CONN, 0x0003)), 2);
    assert_eq!(log.borrow().reads, vec![(SLOT, 0x0003, vec![0x42])]);
}

#[test]
fn test_notification_routed_by_handle() {
    let a = TestService::new(SERVICE_A);
    let log = a.log();
    let mut h = Harness::new(vec![a]);
    let id_a = h.id(SERVICE_A);
    discover_one(&mut h, HandleRange::new(0x0001, 0x0006));

    let owner = dispatch::on_notification(&mut h.registry, &h.discovered, SLOT, 0x0006, &[1, 2]);
    assert_eq!(owner, Some(id_a));
    let owner = dispatch::on_notification(&mut h.registry, &h.discovered, SLOT, 0x0020, &[3]);
    assert_eq!(owner, None);
    let owner = dispatch::on_notification(&mut h.registry, &h.discovered, DeviceSlot(1), 0x0006, &[4]);
    assert_eq!(owner, None);

    assert_eq!(log.borrow().notifications, vec![(SLOT, 0x0006, vec![1, 2])]);
}

#[test]
fn test_one_read_and_one_write_outstanding() {
    let mut link = MockLink::new();
    let mut tracker = ProcedureTracker::new();
    let mut requester = AttributeRequester::new(&mut link, CONN, &mut tracker, None);

    requester.read(0x0010).unwrap();
    assert!(matches!(requester.read(0x0011), Err(CentralError::Busy("read"))));
    requester.write(0x0012, &[0x01]).unwrap();
    assert!(matches!(requester.write(0x0013, &[0x02]), Err(CentralError::Busy("write"))));

    assert_eq!(link.requests.len(), 2);
    assert!(tracker.has_pending_access());
}

#[test]
fn test_registry_capacity_and_duplicates() {
    let mut registry = ServiceRegistry::new(2);
    let first = registry.register(Box::new(TestService::new(SERVICE_A))).unwrap();
    assert_eq!(first.index(), 0);
    assert!(matches!(
        registry.register(Box::new(TestService::new(SERVICE_A))),
        Err(CentralError::DuplicateService(_))
    ));
    registry.register(Box::new(TestService::new(SERVICE_B))).unwrap();
    assert!(matches!(
        registry.register(Box::new(TestService::new(0x3333))),
        Err(CentralError::RegistryFull(2))
    ));

    assert!(registry.matches_any(&[Uuid::Uuid16(0x9999), Uuid::Uuid16(SERVICE_B)]));
    assert!(!registry.matches_any(&[Uuid::Uuid16(0x9999)]));
}

#[test]
fn test_descriptor_ranges_between_characteristics() {
    let mut data = ServiceData::new(HandleRange::new(0x0010, 0x0018));
    let notify = CharacteristicProperties::NOTIFY;
    data.add_characteristic(&characteristic(0xAAAA, 0x0010, notify));
    data.add_characteristic(&characteristic(0xBBBB, 0x0014, CharacteristicProperties::READ));

    let first = data.handles(HandleKind::Characteristic);
    assert_eq!(first.range, HandleRange::new(0x0012, 0x0013));
    assert!(data.add_descriptor(&DescriptorFound {
        uuid: Uuid::Uuid16(0x2902),
        handle: 0x0012,
    }));

    let second = data.handles(HandleKind::Characteristic);
    assert_eq!(second.range, HandleRange::new(0x0016, 0x0018));
    // Not notifiable, so no CCCD is attached
    assert!(!data.add_descriptor(&DescriptorFound {
        uuid: Uuid::Uuid16(0x2902),
        handle: 0x0016,
    }));

    assert!(!data.handles(HandleKind::Characteristic).more);
    assert_eq!(data.characteristics[0].cccd, Some(0x0012));
    assert_eq!(data.characteristics[1].cccd, None);
}

/// Walk services A (0x0001..=0x0006) and B (0x0010..=0x0013), each with a
/// notifiable characteristic and its CCCD.
fn walk_two_services(h: &mut Harness) -> DiscoveryOutcome {
    let notify = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
    let cccd = |handle| DescriptorFound {
        uuid: Uuid::Uuid16(0x2902),
        handle,
    };

    discovery::start(&mut h.ctx()).unwrap();
    discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_A, 0x0001, 0x0006)).unwrap();
    discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap();
    discovery::on_primary_found(&mut h.ctx(), &primary(SERVICE_B, 0x0010, 0x0013)).unwrap();
    discovery::on_primary_complete(&mut h.ctx(), GattStatus::Success).unwrap();

    discovery::on_characteristic_found(&mut h.ctx(), &characteristic(0xAAAA, 0x0002, notify)).unwrap();
    discovery::on_characteristic_found(
        &mut h.ctx(),
        &characteristic(0xAAAB, 0x0005, CharacteristicProperties::READ),
    )
    .unwrap();
    discovery::on_characteristics_complete(&mut h.ctx(), GattStatus::Success).unwrap();
    discovery::on_descriptor_found(&mut h.ctx(), &cccd(0x0004)).unwrap();
    discovery::on_descriptors_complete(&mut h.ctx(), GattStatus::Success).unwrap();

    discovery::on_characteristic_found(&mut h.ctx(), &characteristic(0xBBBB, 0x0011, notify)).unwrap();
    discovery::on_characteristics_complete(&mut h.ctx(), GattStatus::Success).unwrap();
    discovery::on_descriptor_found(&mut h.ctx(), &cccd(0x0013)).unwrap();
    discovery::on_descriptors_complete(&mut h.ctx(), GattStatus::Success).unwrap()
}

#[test]
fn test_reset_then_replay_yields_identical_handles() {
    let a = TestService::new(SERVICE_A);
    let b = TestService::new(SERVICE_B);
    let (log_a, log_b) = (a.log(), b.log());
    let mut h = Harness::new(vec![a, b]);

    assert_eq!(walk_two_services(&mut h), DiscoveryOutcome::Complete);
    assert_eq!(h.session.current_service_index, 0);
    let first = h.link.take();

    h.registry.reset_device(SLOT);
    assert!(!h.registry.get(h.id(SERVICE_A)).found(SLOT));
    h.session = DiscoverySession::new();
    h.discovered.clear();

    assert_eq!(walk_two_services(&mut h), DiscoveryOutcome::Complete);
    assert_eq!(h.link.take(), first);

    for log in [&log_a, &log_b] {
        let log = log.borrow();
        assert_eq!(log.completed.len(), 2);
        assert_eq!(log.completed[0], log.completed[1]);
    }
    let (_, range_a, chars_a) = log_a.borrow().completed[0].clone();
    let (_, range_b, chars_b) = log_b.borrow().completed[0].clone();
    assert!(!range_a.is_empty() && !range_b.is_empty());
    assert!(range_a.end < range_b.start || range_b.end < range_a.start);
    assert_eq!(chars_a[0].cccd, Some(0x0004));
    assert_eq!(chars_a[1].cccd, None);
    assert_eq!(chars_b[0].cccd, Some(0x0013));
}

#[test]
fn test_first_cccd_in_range_belongs_to_the_characteristic() {
    let mut data = ServiceData::new(HandleRange::new(0x0001, 0x0009));
    let notify = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
    data.add_characteristic(&characteristic(0x2A19, 0x0002, notify));

    // The range runs over a characteristic this service did not record
    assert_eq!(
        data.handles(HandleKind::Characteristic).range,
        HandleRange::new(0x0004, 0x0009)
    );
    let cccd = |handle| DescriptorFound {
        uuid: Uuid::Uuid16(0x2902),
        handle,
    };
    assert!(data.add_descriptor(&cccd(0x0004)));
    assert!(!data.add_descriptor(&cccd(0x0007)));
    assert_eq!(data.characteristics[0].cccd, Some(0x0004));
}
