//! Loading network configuration from TOML
//!
//! A network configuration describes the fieldbus class, the cycle period, and for each node the
//! PDOs the master exchanges with it. Example:
//!
//! ```toml
//! class = "can"
//! sync_period_us = 2000
//! dispatch_priority = 80
//!
//! [nodes.1.pdos.rpdo.1]
//! transmission_type = 1
//! mappings = [
//!     { index = 0x60FF, sub = 0, size = 32 },
//! ]
//!
//! [nodes.1.pdos.tpdo.2]
//! cob_id = 0x380
//! add_node_id = true
//! transmission_type = 1
//! mappings = [
//!     { index = 0x6064, sub = 0, size = 32 },
//!     { index = 0x606C, sub = 0, size = 32 },
//! ]
//! ```
//!
//! Transmission types are given as raw CANopen values. There is no default: CANopen and EtherCAT
//! builds of the same application routinely pick different types, so each PDO states its own.
use std::collections::BTreeMap;
use std::path::Path;

use defmt_or_log::debug;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::{
    constants::cob_ids,
    messages::{NetworkClass, PdoAddress},
    node_id::{checked_can_id, CanNodeId, NodeAddress, PdoAddressError},
    pdo::{PdoDirection, PdoMapping, TransmissionType},
};

/// Error returned when loading a network configuration
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// Reading the file failed
    #[snafu(display("Failed to read {path}: {source}"))]
    Io {
        /// The path which failed to load
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The TOML text could not be parsed into a configuration
    #[snafu(display("Failed to parse network config: {source}"))]
    Toml {
        /// The parser error
        source: toml::de::Error,
    },
    /// A table key could not be parsed as a number
    #[snafu(display("Invalid {what} key '{key}'"))]
    InvalidKey {
        /// What the key identifies (node or PDO slot)
        what: &'static str,
        /// The offending key
        key: String,
    },
    /// A node key is not a valid CANopen node ID
    #[snafu(display("Invalid CANopen node ID {id}"))]
    InvalidNodeId {
        /// The offending ID
        id: u16,
    },
    /// A PDO has a reserved transmission type
    #[snafu(display("Node {node} {direction} {slot}: reserved transmission type {value}"))]
    InvalidTransmissionType {
        /// Node key
        node: u16,
        /// PDO direction
        direction: PdoDirection,
        /// PDO slot
        slot: u8,
        /// Raw transmission type
        value: u8,
    },
    /// The PDO has no valid network address for its node
    #[snafu(display("Node {node} {direction} {slot}: {source}"))]
    InvalidPdoAddress {
        /// Node key
        node: u16,
        /// PDO direction
        direction: PdoDirection,
        /// PDO slot
        slot: u8,
        /// Why the address was rejected
        source: PdoAddressError,
    },
    /// The cycle period is zero
    #[snafu(display("sync_period_us must be greater than zero"))]
    ZeroSyncPeriod,
    /// The dispatch priority is outside 1..=99
    #[snafu(display("Dispatch priority {value} is outside 1..=99"))]
    InvalidPriority {
        /// The offending priority
        value: u8,
    },
}

/// Default configuration for one PDO slot of a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdoDefaultConfig {
    /// Explicit COB-ID for CANopen PDOs. None selects the predefined connection set.
    pub cob_id: Option<u32>,
    /// Indicates that an extended (29-bit) COB-ID is used
    pub extended: bool,
    /// Add the node ID to the configured COB-ID
    pub add_node_id: bool,
    /// When the PDO moves across the wire
    pub transmission_type: TransmissionType,
    /// Compare the declared mapping with the device's fixed mapping when binding
    pub verify_fixed_mapping: bool,
    /// The objects mapped into the PDO, in wire order
    pub mappings: Vec<PdoMapping>,
}

impl PdoDefaultConfig {
    /// Resolve the network address of this PDO for a node
    ///
    /// Fails if the COB-ID, after adding the node ID, does not fit the identifier format, or if
    /// the slot has no predefined COB-ID.
    pub fn address(
        &self,
        node: NodeAddress,
        direction: PdoDirection,
        slot: u8,
    ) -> Result<PdoAddress, PdoAddressError> {
        match (node, self.cob_id) {
            (NodeAddress::Can(id), Some(cob_id)) => {
                let mut raw = cob_id as u64;
                if self.add_node_id {
                    raw += id.raw() as u64;
                }
                Ok(PdoAddress::Cob(checked_can_id(raw, self.extended)?))
            }
            _ => {
                let base = match direction {
                    PdoDirection::Outgoing => cob_ids::RPDO_BASE,
                    PdoDirection::Incoming => cob_ids::TPDO_BASE,
                };
                node.default_pdo_address(base, slot)
            }
        }
    }
}

/// The PDOs configured for one node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeConfig {
    /// Outgoing PDOs, by slot
    pub rpdo: BTreeMap<u8, PdoDefaultConfig>,
    /// Incoming PDOs, by slot
    pub tpdo: BTreeMap<u8, PdoDefaultConfig>,
}

/// A complete network configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    /// The fieldbus class
    pub class: NetworkClass,
    /// The cycle period in microseconds (SYNC interval or SYNC0 period)
    pub sync_period_us: u32,
    /// Optional real-time priority for the dispatch thread
    pub dispatch_priority: Option<u8>,
    /// Per node configuration, keyed by node address
    pub nodes: BTreeMap<NodeAddress, NodeConfig>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPdoConfig {
    cob_id: Option<u32>,
    #[serde(default)]
    extended: bool,
    #[serde(default)]
    add_node_id: bool,
    transmission_type: u8,
    #[serde(default = "default_true")]
    verify_fixed_mapping: bool,
    #[serde(default)]
    mappings: Vec<PdoMapping>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawPdos {
    #[serde(default)]
    rpdo: BTreeMap<String, RawPdoConfig>,
    #[serde(default)]
    tpdo: BTreeMap<String, RawPdoConfig>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNodeConfig {
    #[serde(default)]
    pdos: RawPdos,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetworkConfig {
    class: NetworkClass,
    sync_period_us: u32,
    dispatch_priority: Option<u8>,
    #[serde(default)]
    nodes: BTreeMap<String, RawNodeConfig>,
}

fn default_true() -> bool {
    true
}

fn parse_key<T: TryFrom<u32>>(what: &'static str, key: &str) -> Result<T, LoadError> {
    let value = match key.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => key.parse::<u32>().ok(),
    };
    value
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| LoadError::InvalidKey {
            what,
            key: key.to_string(),
        })
}

fn convert_pdos(
    node: NodeAddress,
    direction: PdoDirection,
    raw: BTreeMap<String, RawPdoConfig>,
) -> Result<BTreeMap<u8, PdoDefaultConfig>, LoadError> {
    let mut pdos = BTreeMap::new();
    for (key, pdo) in raw {
        let slot: u8 = parse_key("PDO slot", &key)?;
        let transmission_type = TransmissionType::from_raw(pdo.transmission_type).map_err(|e| {
            LoadError::InvalidTransmissionType {
                node: node.raw(),
                direction,
                slot,
                value: e.value,
            }
        })?;
        let config = PdoDefaultConfig {
            cob_id: pdo.cob_id,
            extended: pdo.extended,
            add_node_id: pdo.add_node_id,
            transmission_type,
            verify_fixed_mapping: pdo.verify_fixed_mapping,
            mappings: pdo.mappings,
        };
        config
            .address(node, direction, slot)
            .context(InvalidPdoAddressSnafu {
                node: node.raw(),
                direction,
                slot,
            })?;
        pdos.insert(slot, config);
    }
    Ok(pdos)
}

impl NetworkConfig {
    /// Parse a network configuration from a TOML string
    pub fn load_from_str(s: &str) -> Result<Self, LoadError> {
        let raw: RawNetworkConfig = toml::from_str(s).context(TomlSnafu)?;

        if raw.sync_period_us == 0 {
            return ZeroSyncPeriodSnafu.fail();
        }
        if let Some(value) = raw.dispatch_priority {
            if !(1..=99).contains(&value) {
                return InvalidPrioritySnafu { value }.fail();
            }
        }

        let mut nodes = BTreeMap::new();
        for (key, node) in raw.nodes {
            let id: u16 = parse_key("node", &key)?;
            let address = match raw.class {
                NetworkClass::Can => {
                    let can_id = u8::try_from(id)
                        .ok()
                        .and_then(|id| CanNodeId::new(id).ok())
                        .ok_or(LoadError::InvalidNodeId { id })?;
                    NodeAddress::Can(can_id)
                }
                NetworkClass::EtherCat => NodeAddress::EtherCat(id),
            };
            let config = NodeConfig {
                rpdo: convert_pdos(address, PdoDirection::Outgoing, node.pdos.rpdo)?,
                tpdo: convert_pdos(address, PdoDirection::Incoming, node.pdos.tpdo)?,
            };
            nodes.insert(address, config);
        }

        debug!(
            "Loaded {} network config with {} nodes",
            raw.class,
            nodes.len()
        );

        Ok(Self {
            class: raw.class,
            sync_period_us: raw.sync_period_us,
            dispatch_priority: raw.dispatch_priority,
            nodes,
        })
    }

    /// Read and parse a network configuration file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(IoSnafu {
            path: path.display().to_string(),
        })?;
        Self::load_from_str(&text)
    }

    /// The cycle period as a Duration
    pub fn sync_period(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.sync_period_us as u64)
    }

    /// Get the configuration of a node, if any
    pub fn node(&self, address: NodeAddress) -> Option<&NodeConfig> {
        self.nodes.get(&address)
    }
}
