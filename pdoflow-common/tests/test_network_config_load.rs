use std::io::Write;

use assertables::assert_contains;
use pdoflow_common::{
    messages::{CanId, NetworkClass, PdoAddress},
    network_config::{LoadError, NetworkConfig, PdoDefaultConfig},
    node_id::{CanNodeId, NodeAddress, PdoAddressError},
    pdo::{PdoDirection, PdoMapping, TransmissionType},
};

const CAN_CFG: &str = r#"
    class = "can"
    sync_period_us = 2000
    dispatch_priority = 80

    # Velocity command for the drive
    [nodes.1.pdos.rpdo.1]
    transmission_type = 1
    mappings = [
        { index=0x60FF, sub=0, size=32 },
    ]

    [nodes.1.pdos.tpdo.2]
    cob_id = 0x380
    add_node_id = true
    transmission_type = 10
    mappings = [
        { index=0x6064, sub=0, size=32 },
        { index=0x606C, sub=0, size=32 },
    ]
"#;

#[test]
fn test_can_config() {
    let cfg = NetworkConfig::load_from_str(CAN_CFG).expect("Failed to parse network config");
    assert_eq!(NetworkClass::Can, cfg.class);
    assert_eq!(2, cfg.sync_period().as_millis());
    assert_eq!(Some(80), cfg.dispatch_priority);

    let node = NodeAddress::Can(CanNodeId::new(1).unwrap());
    let node_cfg = cfg.node(node).expect("Node 1 missing");

    let rpdo = node_cfg.rpdo.get(&1).unwrap();
    assert_eq!(
        *rpdo,
        PdoDefaultConfig {
            cob_id: None,
            extended: false,
            add_node_id: false,
            transmission_type: TransmissionType::Cyclic(1),
            verify_fixed_mapping: true,
            mappings: vec![PdoMapping {
                index: 0x60FF,
                sub: 0,
                size: 32
            }],
        }
    );
    // Without a COB-ID the predefined connection set applies
    assert_eq!(
        Ok(PdoAddress::Cob(CanId::Std(0x301))),
        rpdo.address(node, PdoDirection::Outgoing, 1)
    );

    let tpdo = node_cfg.tpdo.get(&2).unwrap();
    assert_eq!(TransmissionType::Cyclic(10), tpdo.transmission_type);
    assert_eq!(2, tpdo.mappings.len());
    assert_eq!(
        Ok(PdoAddress::Cob(CanId::Std(0x381))),
        tpdo.address(node, PdoDirection::Incoming, 2)
    );
}

#[test]
fn test_ethercat_config() {
    const CFG: &str = r#"
        class = "ethercat"
        sync_period_us = 1000

        [nodes.1001.pdos.tpdo.0]
        transmission_type = 255
        verify_fixed_mapping = false
        mappings = [
            { index=0x6000, sub=1, size=1 },
            { index=0x6000, sub=2, size=1 },
        ]
    "#;
    let cfg = NetworkConfig::load_from_str(CFG).unwrap();
    let node = NodeAddress::EtherCat(1001);
    let tpdo = cfg.node(node).unwrap().tpdo.get(&0).unwrap();
    assert_eq!(TransmissionType::Event, tpdo.transmission_type);
    assert!(!tpdo.verify_fixed_mapping);
    assert_eq!(
        PdoAddress::Slot {
            station: 1001,
            slot: 0
        },
        tpdo.address(node, PdoDirection::Incoming, 0).unwrap()
    );
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CAN_CFG.as_bytes()).unwrap();
    let cfg = NetworkConfig::load_from_file(file.path()).unwrap();
    assert_eq!(1, cfg.nodes.len());

    let missing = NetworkConfig::load_from_file("/nonexistent/pdoflow.toml");
    assert!(matches!(missing, Err(LoadError::Io { .. })));
}

#[test]
fn test_invalid_configs() {
    let reserved_type = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.2.pdos.rpdo.0]
        transmission_type = 245
    "#;
    let err = NetworkConfig::load_from_str(reserved_type).unwrap_err();
    assert!(matches!(
        err,
        LoadError::InvalidTransmissionType {
            node: 2,
            slot: 0,
            value: 245,
            ..
        }
    ));

    let bad_node = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.200.pdos.rpdo.0]
        transmission_type = 1
    "#;
    assert!(matches!(
        NetworkConfig::load_from_str(bad_node),
        Err(LoadError::InvalidNodeId { id: 200 })
    ));

    let unknown_field = r#"
        class = "can"
        sync_period_us = 1000
        sync_period_ms = 1
    "#;
    let err = NetworkConfig::load_from_str(unknown_field).unwrap_err();
    assert_contains!(err.to_string(), "sync_period_ms");

    let zero_period = r#"
        class = "ethercat"
        sync_period_us = 0
    "#;
    assert!(matches!(
        NetworkConfig::load_from_str(zero_period),
        Err(LoadError::ZeroSyncPeriod)
    ));
}

#[test]
fn test_unaddressable_pdos() {
    // No predefined COB-ID beyond the fourth slot
    let high_slot = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.1.pdos.rpdo.255]
        transmission_type = 1
    "#;
    let err = NetworkConfig::load_from_str(high_slot).unwrap_err();
    assert!(matches!(
        err,
        LoadError::InvalidPdoAddress {
            node: 1,
            direction: PdoDirection::Outgoing,
            slot: 255,
            source: PdoAddressError::SlotOutOfRange { slot: 255 },
        }
    ));
    assert_contains!(err.to_string(), "Node 1 RPDO 255");

    let wrapping_slot = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.1.pdos.rpdo.6]
        transmission_type = 1
    "#;
    assert!(matches!(
        NetworkConfig::load_from_str(wrapping_slot),
        Err(LoadError::InvalidPdoAddress { slot: 6, .. })
    ));

    // 0x7FF + 2 no longer fits an 11-bit identifier
    let std_overflow = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.2.pdos.tpdo.1]
        cob_id = 0x7FF
        add_node_id = true
        transmission_type = 1
    "#;
    assert!(matches!(
        NetworkConfig::load_from_str(std_overflow),
        Err(LoadError::InvalidPdoAddress {
            node: 2,
            direction: PdoDirection::Incoming,
            slot: 1,
            source: PdoAddressError::CobIdOutOfRange {
                raw: 0x801,
                bits: 11
            },
        })
    ));

    let u32_overflow = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.127.pdos.tpdo.1]
        cob_id = 4294967295
        extended = true
        add_node_id = true
        transmission_type = 1
    "#;
    assert!(matches!(
        NetworkConfig::load_from_str(u32_overflow),
        Err(LoadError::InvalidPdoAddress {
            source: PdoAddressError::CobIdOutOfRange { bits: 29, .. },
            ..
        })
    ));

    // Extended identifiers may go above 0x7FF
    let extended = r#"
        class = "can"
        sync_period_us = 1000
        [nodes.2.pdos.tpdo.1]
        cob_id = 0x18FF0000
        extended = true
        add_node_id = true
        transmission_type = 1
    "#;
    let cfg = NetworkConfig::load_from_str(extended).unwrap();
    let node = NodeAddress::Can(CanNodeId::new(2).unwrap());
    let tpdo = cfg.node(node).unwrap().tpdo.get(&1).unwrap();
    assert_eq!(
        Ok(PdoAddress::Cob(CanId::Extended(0x18FF0002))),
        tpdo.address(node, PdoDirection::Incoming, 1)
    );
}
