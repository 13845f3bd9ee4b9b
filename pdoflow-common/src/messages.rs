//! Addresses and frames exchanged over the network

use snafu::Snafu;

/// Maximum number of payload bytes in one PDO frame
pub const MAX_PDO_BYTES: usize = 32;

/// The kind of fieldbus a network is running on
///
/// The class decides how much process data fits in one PDO.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum NetworkClass {
    /// CANopen over classic CAN; 8 bytes per PDO
    Can,
    /// CANopen over EtherCAT; 32 bytes per PDO
    #[cfg_attr(feature = "std", serde(alias = "ecat"))]
    EtherCat,
}

impl NetworkClass {
    /// The PDO payload capacity in bits
    pub const fn capacity_bits(&self) -> usize {
        match self {
            NetworkClass::Can => 64,
            NetworkClass::EtherCat => 256,
        }
    }

    /// The PDO payload capacity in bytes
    pub const fn capacity_bytes(&self) -> usize {
        self.capacity_bits() / 8
    }
}

impl core::fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NetworkClass::Can => write!(f, "CANopen"),
            NetworkClass::EtherCat => write!(f, "EtherCAT"),
        }
    }
}

/// A CAN identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    /// A standard 11-bit identifier
    Std(u16),
    /// An extended 29-bit identifier
    Extended(u32),
}

impl CanId {
    /// Create a standard ID
    pub const fn std(id: u16) -> Self {
        CanId::Std(id & 0x7FF)
    }

    /// Create an extended ID
    pub const fn extended(id: u32) -> Self {
        CanId::Extended(id & 0x1FFF_FFFF)
    }

    /// Get the raw identifier value
    pub const fn raw(&self) -> u32 {
        match self {
            CanId::Std(id) => *id as u32,
            CanId::Extended(id) => *id,
        }
    }

    /// True for 29-bit identifiers
    pub const fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl core::fmt::Display for CanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CanId::Std(id) => write!(f, "0x{id:03X}"),
            CanId::Extended(id) => write!(f, "0x{id:08X}x"),
        }
    }
}

/// The address a PDO is exchanged on
///
/// On CANopen this is the COB-ID of the message carrying the PDO. On EtherCAT a PDO occupies one of
/// the device's PDO slots inside the cyclic process image, identified by the station address of
/// the device and the slot number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdoAddress {
    /// A CAN message identifier
    Cob(CanId),
    /// A PDO slot of an EtherCAT device
    Slot {
        /// Configured station address of the device
        station: u16,
        /// PDO slot number on that device
        slot: u8,
    },
}

impl PdoAddress {
    /// True if this address can be used on a network of the given class
    pub const fn matches_class(&self, class: NetworkClass) -> bool {
        matches!(
            (self, class),
            (PdoAddress::Cob(_), NetworkClass::Can) | (PdoAddress::Slot { .. }, NetworkClass::EtherCat)
        )
    }
}

impl core::fmt::Display for PdoAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PdoAddress::Cob(id) => write!(f, "COB {id}"),
            PdoAddress::Slot { station, slot } => write!(f, "station {station} slot {slot}"),
        }
    }
}

/// Error returned when a payload does not fit into a [`PdoFrame`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[snafu(display("Payload of {len} bytes exceeds the {MAX_PDO_BYTES} byte PDO frame"))]
pub struct PayloadTooLong {
    /// Length of the rejected payload
    pub len: usize,
}

/// One PDO datagram
///
/// The storage is always [`MAX_PDO_BYTES`] long; `len` tells how many of those bytes are on the
/// wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PdoFrame {
    address: PdoAddress,
    len: u8,
    data: [u8; MAX_PDO_BYTES],
}

impl PdoFrame {
    /// Create a frame from a payload slice
    pub fn new(address: PdoAddress, payload: &[u8]) -> Result<Self, PayloadTooLong> {
        if payload.len() > MAX_PDO_BYTES {
            return PayloadTooLongSnafu { len: payload.len() }.fail();
        }
        let mut data = [0; MAX_PDO_BYTES];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            address,
            len: payload.len() as u8,
            data,
        })
    }

    /// The address the frame is sent on
    pub fn address(&self) -> PdoAddress {
        self.address
    }

    /// The payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// The payload length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True if the frame carries no payload
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for PdoFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PdoFrame {{ {}, [", self.address)?;
        for (i, b) in self.data().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, "] }}")
    }
}
