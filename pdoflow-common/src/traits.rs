//! Common traits
//!
//! These are the seams between the process data engine and the collaborators it does not
//! implement: the transport moving frames on the wire, and the device side object dictionary
//! (usually reached through SDO transfers).

use snafu::Snafu;

use crate::{
    messages::PdoFrame,
    pdo::{PdoDirection, PdoMapping},
};

/// Errors a transport may return when sending
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum TransportError {
    /// The link is down, or the interface has been closed
    Disconnected,
    /// The driver's transmit queue is full
    QueueFull,
    /// The frame does not fit the link (e.g. more than 8 bytes on classic CAN)
    #[snafu(display("Frame of {len} bytes does not fit the link"))]
    FrameTooLong {
        /// Length of the rejected payload
        len: usize,
    },
    /// The transport cannot reach the frame's address (e.g. an EtherCAT slot on a CAN link)
    UnsupportedAddress,
    /// Any other driver error, by raw code
    #[snafu(display("Driver error {code}"))]
    Driver {
        /// Driver specific error code
        code: i32,
    },
}

/// A synchronous frame sender
///
/// Implementations are shared between the dispatch thread and application threads calling
/// `transmit`, so `send` takes `&self`.
pub trait Transport: Send + Sync {
    /// Send a frame to the bus
    fn send(&self, frame: &PdoFrame) -> Result<(), TransportError>;
}

/// Information about one object dictionary entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Size of the object in bits
    pub bits: u8,
}

/// Access to the object dictionary of a remote device
///
/// Used only while binding PDOs with mapping verification enabled.
pub trait DeviceAccess: Send + Sync {
    /// Look up an entry of the device's object dictionary
    ///
    /// Returns None if the device has no such object.
    fn object_info(&self, index: u16, sub: u8) -> Option<ObjectInfo>;

    /// The fixed mapping of a PDO slot, if the device's mapping for that slot cannot be changed
    ///
    /// Devices with freely mappable PDOs return None.
    fn fixed_mapping(&self, direction: PdoDirection, slot: u8) -> Option<&[PdoMapping]>;
}
