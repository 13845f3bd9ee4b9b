//! Types for addressing the devices on a network
//!

use snafu::Snafu;

use crate::messages::{CanId, NetworkClass, PdoAddress};
use crate::constants::cob_ids;

/// Highest 11-bit identifier
const MAX_STD_ID: u32 = 0x7FF;
/// Highest 29-bit identifier
const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Error returned when a PDO address cannot be resolved for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum PdoAddressError {
    /// The slot has no COB-ID in the predefined connection set
    #[snafu(display(
        "Slot {slot} is outside the predefined connection set (0..{})",
        cob_ids::PREDEFINED_SLOTS
    ))]
    SlotOutOfRange {
        /// The rejected slot
        slot: u8,
    },
    /// The resolved COB-ID does not fit the identifier format
    #[snafu(display("COB-ID 0x{raw:X} does not fit a {bits}-bit identifier"))]
    CobIdOutOfRange {
        /// The COB-ID before any truncation
        raw: u64,
        /// Width of the requested identifier format
        bits: u8,
    },
}

/// Build a CAN ID from a resolved COB-ID, rejecting values the format cannot hold
pub fn checked_can_id(raw: u64, extended: bool) -> Result<CanId, PdoAddressError> {
    let (max, bits) = if extended {
        (MAX_EXTENDED_ID, 29)
    } else {
        (MAX_STD_ID, 11)
    };
    if raw > max as u64 {
        return CobIdOutOfRangeSnafu { raw, bits }.fail();
    }
    Ok(if extended {
        CanId::Extended(raw as u32)
    } else {
        CanId::Std(raw as u16)
    })
}

/// A newtype on u8 to enforce a valid CANopen node ID (1-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanNodeId(u8);

impl CanNodeId {
    /// Try to create a new CanNodeId
    ///
    /// It will fail if value is invalid (i.e. <1 or >127)
    pub const fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value > 0 && value < 128 {
            Ok(CanNodeId(value))
        } else {
            Err(InvalidNodeIdError)
        }
    }

    /// Get the raw node ID as a u8
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// COB-ID of a PDO in the predefined connection set
    ///
    /// `base` is one of [`cob_ids::TPDO_BASE`] or [`cob_ids::RPDO_BASE`]; every slot adds 0x100.
    /// Slots from [`cob_ids::PREDEFINED_SLOTS`] on would collide with other function codes and
    /// are rejected.
    pub fn default_pdo_cob_id(&self, base: u16, slot: u8) -> Result<CanId, PdoAddressError> {
        if slot >= cob_ids::PREDEFINED_SLOTS {
            return SlotOutOfRangeSnafu { slot }.fail();
        }
        let raw = base as u64 + slot as u64 * 0x100 + self.0 as u64;
        checked_can_id(raw, false)
    }
}

impl core::fmt::Display for CanNodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CanNodeId> for u8 {
    fn from(value: CanNodeId) -> Self {
        value.raw()
    }
}

impl TryFrom<u8> for CanNodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CanNodeId::new(value)
    }
}

/// Identifies one device on a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeAddress {
    /// A CANopen node
    Can(CanNodeId),
    /// An EtherCAT device, by configured station address
    EtherCat(u16),
}

impl NodeAddress {
    /// The network class this address belongs to
    pub fn class(&self) -> NetworkClass {
        match self {
            NodeAddress::Can(_) => NetworkClass::Can,
            NodeAddress::EtherCat(_) => NetworkClass::EtherCat,
        }
    }

    /// A numeric identifier, used for logging and for "add node id" address offsets
    pub fn raw(&self) -> u16 {
        match self {
            NodeAddress::Can(id) => id.raw() as u16,
            NodeAddress::EtherCat(station) => *station,
        }
    }

    /// The default PDO address for a slot
    ///
    /// CANopen nodes use the predefined connection set; `base` selects the TPDO or RPDO function
    /// code. EtherCAT devices address the slot directly and ignore `base`.
    pub fn default_pdo_address(&self, base: u16, slot: u8) -> Result<PdoAddress, PdoAddressError> {
        match self {
            NodeAddress::Can(id) => Ok(PdoAddress::Cob(id.default_pdo_cob_id(base, slot)?)),
            NodeAddress::EtherCat(station) => Ok(PdoAddress::Slot {
                station: *station,
                slot,
            }),
        }
    }

    /// Shortcut for the default address of an outgoing (RPDO) slot
    pub fn rpdo_address(&self, slot: u8) -> Result<PdoAddress, PdoAddressError> {
        self.default_pdo_address(cob_ids::RPDO_BASE, slot)
    }

    /// Shortcut for the default address of an incoming (TPDO) slot
    pub fn tpdo_address(&self, slot: u8) -> Result<PdoAddress, PdoAddressError> {
        self.default_pdo_address(cob_ids::TPDO_BASE, slot)
    }
}

impl core::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NodeAddress::Can(id) => write!(f, "CAN node {id}"),
            NodeAddress::EtherCat(station) => write!(f, "EtherCAT station {station}"),
        }
    }
}

/// Error for converting u8 to a CanNodeId
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNodeIdError;

impl core::fmt::Display for InvalidNodeIdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Invalid node ID")
    }
}
impl core::error::Error for InvalidNodeIdError {}
