//! Definitions and data types related to PDOs

use snafu::Snafu;

/// Represents a PDO mapping
///
/// Each mapping specifies one sub-object to be included in the PDO data bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(deny_unknown_fields)
)]
pub struct PdoMapping {
    /// The object index
    pub index: u16,
    /// The object sub index
    pub sub: u8,
    /// The size of the object to map, in **bits**
    pub size: u8,
}

impl PdoMapping {
    /// Convert a PdoMapping object to the u32 representation stored in the PdoMapping object
    pub fn to_object_value(&self) -> u32 {
        ((self.index as u32) << 16) | ((self.sub as u32) << 8) | (self.size as u32)
    }

    /// Create a PdoMapping object from the raw u32 representation stored in the PdoMapping object
    pub fn from_object_value(value: u32) -> Self {
        let index = (value >> 16) as u16;
        let sub = ((value >> 8) & 0xff) as u8;
        let size = (value & 0xff) as u8;
        Self { index, sub, size }
    }
}

/// Which way a PDO travels
///
/// PDO names are given from the device's point of view: the device receives RPDOs and transmits
/// TPDOs. pdoflow runs on the master, so an RPDO is outgoing and a TPDO incoming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdoDirection {
    /// Master to device (RPDO)
    Outgoing,
    /// Device to master (TPDO)
    Incoming,
}

impl core::fmt::Display for PdoDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PdoDirection::Outgoing => write!(f, "RPDO"),
            PdoDirection::Incoming => write!(f, "TPDO"),
        }
    }
}

/// Error returned for raw transmission type values with no meaning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[snafu(display("Reserved PDO transmission type {value}"))]
pub struct InvalidTransmissionType {
    /// The rejected raw value
    pub value: u8,
}

/// When a PDO moves across the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmissionType {
    /// Sent on the next SYNC after the application requested a transmission (raw value 0)
    SyncAcyclic,
    /// Sent, or expected, on every Nth SYNC (raw values 1-240)
    Cyclic(u8),
    /// Sent only when requested by a remote frame (raw values 252 and 253)
    OnRequest,
    /// Sent as soon as the application transmits; received data is handled on arrival (raw
    /// values 254 and 255)
    Event,
}

impl TransmissionType {
    /// Interpret a raw CANopen transmission type value
    pub fn from_raw(value: u8) -> Result<Self, InvalidTransmissionType> {
        match value {
            0 => Ok(TransmissionType::SyncAcyclic),
            1..=240 => Ok(TransmissionType::Cyclic(value)),
            252 | 253 => Ok(TransmissionType::OnRequest),
            254 | 255 => Ok(TransmissionType::Event),
            _ => InvalidTransmissionTypeSnafu { value }.fail(),
        }
    }

    /// The raw CANopen value for this transmission type
    pub fn to_raw(&self) -> u8 {
        match self {
            TransmissionType::SyncAcyclic => 0,
            TransmissionType::Cyclic(n) => *n,
            TransmissionType::OnRequest => 253,
            TransmissionType::Event => 255,
        }
    }

    /// True for the types that are driven by the SYNC tick
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self,
            TransmissionType::SyncAcyclic | TransmissionType::Cyclic(_)
        )
    }
}

impl Default for TransmissionType {
    fn default() -> Self {
        TransmissionType::Cyclic(1)
    }
}

impl TryFrom<u8> for TransmissionType {
    type Error = InvalidTransmissionType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_raw(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_object_value() {
        let mapping = PdoMapping {
            index: 0x6064,
            sub: 0,
            size: 32,
        };
        assert_eq!(0x6064_0020, mapping.to_object_value());
        assert_eq!(mapping, PdoMapping::from_object_value(0x6064_0020));
    }

    #[test]
    fn test_transmission_type_raw() {
        assert_eq!(Ok(TransmissionType::Cyclic(10)), TransmissionType::from_raw(10));
        assert_eq!(Ok(TransmissionType::Event), TransmissionType::from_raw(254));
        assert_eq!(Ok(TransmissionType::SyncAcyclic), TransmissionType::from_raw(0));
        assert_eq!(
            Err(InvalidTransmissionType { value: 245 }),
            TransmissionType::from_raw(245)
        );
        assert_eq!(1, TransmissionType::Cyclic(1).to_raw());
        assert!(!TransmissionType::Event.is_synchronous());
    }
}
