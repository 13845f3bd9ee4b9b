use std::sync::Arc;
use std::time::Duration;

use integration_tests::prelude::*;
use pdoflow_common::constants::object_ids;
use pdoflow_common::network_config::NetworkConfig;
use pdoflow_engine::{BitField, SyncMode};

fn drive_address() -> NodeAddress {
    NodeAddress::Can(CanNodeId::new(3).unwrap())
}

fn open_can(bus: &SimBus) -> Network {
    init_logging();
    Network::open(bus.transport(), NetworkOptions::external(NetworkClass::Can)).unwrap()
}

fn feedback_tpdo(first: PdoMapping, second: PdoMapping) -> PdoContainer {
    let mut tpdo = PdoContainer::incoming(NetworkClass::Can);
    tpdo.init(drive_address().tpdo_address(1).unwrap()).unwrap();
    tpdo.add_var(pdoflow_engine::DynVar::from_mapping(&first).unwrap())
        .unwrap();
    tpdo.add_var(pdoflow_engine::DynVar::from_mapping(&second).unwrap())
        .unwrap();
    tpdo
}

const STATUS: PdoMapping = PdoMapping {
    index: object_ids::STATUS_WORD,
    sub: 0,
    size: 16,
};
const POSITION: PdoMapping = PdoMapping {
    index: object_ids::POSITION_ACTUAL,
    sub: 0,
    size: 32,
};

#[test]
fn test_unknown_object_is_rejected() {
    let bus = SimBus::new();
    let network = open_can(&bus);
    let node = Node::with_device(&network, drive_address(), Arc::new(SimDevice::drive())).unwrap();

    let mut rpdo = PdoContainer::outgoing(NetworkClass::Can);
    rpdo.init(drive_address().rpdo_address(1).unwrap()).unwrap();
    rpdo.add_var(MappedVar::<u16>::new(0x2000, 1)).unwrap();
    assert_eq!(
        ConfigError::UnknownObject {
            index: 0x2000,
            sub: 1
        },
        node.pdo_set(1, rpdo).unwrap_err()
    );
    assert!(node.pdos().is_empty());
}

#[test]
fn test_width_mismatch_is_rejected() {
    let bus = SimBus::new();
    let network = open_can(&bus);
    let node = Node::with_device(&network, drive_address(), Arc::new(SimDevice::drive())).unwrap();

    let mut rpdo = PdoContainer::outgoing(NetworkClass::Can);
    rpdo.init(drive_address().rpdo_address(1).unwrap()).unwrap();
    // The control word is 16 bits
    rpdo.add_var(MappedVar::<u32>::new(object_ids::CONTROL_WORD, 0))
        .unwrap();
    assert_eq!(
        ConfigError::WidthMismatch {
            index: object_ids::CONTROL_WORD,
            sub: 0,
            declared: 32,
            actual: 16
        },
        node.pdo_set(1, rpdo).unwrap_err()
    );

    // Verification can be turned off per container
    let mut rpdo = PdoContainer::outgoing(NetworkClass::Can);
    rpdo.init(drive_address().rpdo_address(1).unwrap()).unwrap();
    rpdo.add_var(MappedVar::<u32>::new(object_ids::CONTROL_WORD, 0))
        .unwrap();
    rpdo.set_verify_fixed_mapping(false);
    node.pdo_set(1, rpdo).unwrap();
}

/// A device with a fixed mapping only accepts a container with exactly that layout
#[test]
fn test_fixed_mapping() {
    let bus = SimBus::new();
    let network = open_can(&bus);
    let device = SimDevice::drive().with_fixed_mapping(
        PdoDirection::Incoming,
        1,
        vec![STATUS, POSITION],
    );
    let node = Node::with_device(&network, drive_address(), Arc::new(device)).unwrap();

    assert_eq!(
        ConfigError::FixedMappingMismatch {
            node: drive_address(),
            direction: PdoDirection::Incoming,
            slot: 1
        },
        node.pdo_set(1, feedback_tpdo(POSITION, STATUS)).unwrap_err()
    );

    // The failed attempt left the slot free
    let tpdo = node.pdo_set(1, feedback_tpdo(STATUS, POSITION)).unwrap();
    assert_eq!(vec![STATUS, POSITION], tpdo.mappings());

    // Slots without a fixed mapping accept any valid layout
    let mut tpdo = feedback_tpdo(POSITION, STATUS);
    tpdo.init(drive_address().tpdo_address(2).unwrap()).unwrap();
    node.pdo_set(2, tpdo).unwrap();
}

/// Without device access nothing is verified
#[test]
fn test_node_without_device() {
    let bus = SimBus::new();
    let network = open_can(&bus);
    let node = Node::new(&network, drive_address()).unwrap();

    let mut rpdo = PdoContainer::outgoing(NetworkClass::Can);
    rpdo.init(drive_address().rpdo_address(1).unwrap()).unwrap();
    rpdo.add_var(MappedVar::<u32>::new(0x2000, 1)).unwrap();
    assert!(rpdo.verify_fixed_mapping());
    node.pdo_set(1, rpdo).unwrap();
}

const COUPLER_CFG: &str = r#"
    class = "ethercat"
    sync_period_us = 1000

    # Digital inputs: four single bits, an 11-bit counter, a status bit, then an analog word
    [nodes.1001.pdos.tpdo.0]
    transmission_type = 1
    verify_fixed_mapping = false
    mappings = [
        { index=0x6000, sub=1, size=1 },
        { index=0x6000, sub=2, size=1 },
        { index=0x6000, sub=3, size=1 },
        { index=0x6000, sub=4, size=1 },
        { index=0x6000, sub=5, size=11 },
        { index=0x6000, sub=6, size=1 },
        { index=0x6010, sub=1, size=16 },
    ]

    [nodes.1001.pdos.rpdo.0]
    transmission_type = 1
    mappings = [
        { index=0x7000, sub=1, size=16 },
    ]
"#;

/// An I/O coupler with packed bit mappings, built from a configuration file
#[test]
fn test_coupler_from_config() {
    init_logging();
    let config = NetworkConfig::load_from_str(COUPLER_CFG).unwrap();
    let bus = SimBus::new();
    let network = Network::open_with_config(bus.transport(), &config).unwrap();
    assert_eq!(NetworkClass::EtherCat, network.class());
    assert_eq!(
        SyncMode::Timer(Duration::from_millis(1)),
        network.sync_mode()
    );

    let address = NodeAddress::EtherCat(1001);
    let node_cfg = config.node(address).unwrap();
    let node = Node::new(&network, address).unwrap();

    let inputs = PdoContainer::from_config(
        PdoDirection::Incoming,
        network.class(),
        address,
        0,
        &node_cfg.tpdo[&0],
    )
    .unwrap();
    assert_eq!(2, inputs.vars.len());
    assert_eq!(32, inputs.container.used_bits());
    assert!(!inputs.container.verify_fixed_mapping());

    let (word, counter) = inputs.field(0x6000, 5).unwrap();
    assert_eq!(BitField::new(4, 11), counter);
    let word = word.clone();
    let (_, status_bit) = inputs.field(0x6000, 6).unwrap();
    let (_, input_1) = inputs.field(0x6000, 1).unwrap();
    let (_, input_2) = inputs.field(0x6000, 2).unwrap();
    let analog = inputs.var(0x6010, 1).unwrap().clone();
    assert!(inputs.field(0x6010, 1).is_none());
    assert!(inputs.var(0x6000, 1).is_none());
    node.pdo_set(0, inputs.container).unwrap();

    let outputs = PdoContainer::from_config(
        PdoDirection::Outgoing,
        network.class(),
        address,
        0,
        &node_cfg.rpdo[&0],
    )
    .unwrap();
    let output_word = outputs.var(0x7000, 1).unwrap().clone();
    node.pdo_set(0, outputs.container).unwrap();
    output_word.write_raw(0x00FF);
    node.start_node();

    let frame = PdoFrame::new(
        PdoAddress::Slot {
            station: 1001,
            slot: 0,
        },
        &[0x35, 0x92, 0x34, 0x12],
    )
    .unwrap();
    assert!(network.deliver(&frame));

    let start = network.ticks();
    network
        .wait_for_tick(start + 2, Duration::from_secs(2))
        .unwrap();

    let raw = word.read_raw() as u16;
    assert_eq!(0x9235, raw);
    assert!(input_1.is_set(raw));
    assert!(!input_2.is_set(raw));
    assert_eq!(0x123, counter.get(raw));
    assert!(status_bit.is_set(raw));
    assert_eq!(0x1234, analog.read_raw());

    let sent = bus.sent_to(address.rpdo_address(0).unwrap());
    assert!(!sent.is_empty());
    assert_eq!(&[0xFF, 0x00], sent[0].data());
}
