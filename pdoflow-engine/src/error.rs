//! Error types returned by the engine

use pdoflow_common::{
    messages::{NetworkClass, PdoAddress},
    node_id::{NodeAddress, PdoAddressError},
    pdo::PdoDirection,
    traits::TransportError,
};
use snafu::Snafu;

use crate::pdo::PdoState;

/// Static mapping and layout problems
///
/// These are returned by setup calls and are never retried. Each variant carries enough context
/// to find the offending mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// Appending the variable would overflow the PDO
    #[snafu(display(
        "Object 0x{index:04X}.{sub} needs {needed} bits, but the PDO has only {available} of {capacity} left"
    ))]
    CapacityExceeded {
        /// Object index of the rejected variable
        index: u16,
        /// Object sub index of the rejected variable
        sub: u8,
        /// Width of the rejected variable in bits
        needed: usize,
        /// Bits still free in the PDO
        available: usize,
        /// Total capacity of the PDO in bits
        capacity: usize,
    },
    /// Mapped variables must be 8, 16 or 32 bits wide
    #[snafu(display("Object 0x{index:04X}.{sub}: unsupported width of {bits} bits"))]
    InvalidWidth {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
        /// The rejected width
        bits: u8,
    },
    /// The variable is already part of another PDO
    #[snafu(display("Object 0x{index:04X}.{sub} is already mapped into a PDO"))]
    AlreadyMapped {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
    },
    /// A sub-byte mapping run does not fill whole 16-bit words
    #[snafu(display("Sub-byte mappings starting at 0x{index:04X}.{sub} do not fill a 16-bit word"))]
    UnalignedMapping {
        /// Index of the first object of the run
        index: u16,
        /// Sub index of the first object of the run
        sub: u8,
    },
    /// The PDO has no network address
    MissingAddress,
    /// No network address can be resolved for the slot
    #[snafu(display("{direction} {slot} of {node} has no valid address: {source}"))]
    InvalidAddress {
        /// The node owning the slot
        node: NodeAddress,
        /// PDO direction
        direction: PdoDirection,
        /// The slot
        slot: u8,
        /// Why the address was rejected
        source: PdoAddressError,
    },
    /// The address cannot be used on this network
    #[snafu(display("{address} cannot be used on a {class} network"))]
    AddressClassMismatch {
        /// The rejected address
        address: PdoAddress,
        /// The class of the PDO or network
        class: NetworkClass,
    },
    /// The node does not belong on this network
    #[snafu(display("{node} cannot be used on a {class} network"))]
    NodeClassMismatch {
        /// The rejected node
        node: NodeAddress,
        /// The network class
        class: NetworkClass,
    },
    /// Only incoming PDOs have a receive hook
    #[snafu(display("A receive hook cannot be set on an {direction}"))]
    WrongDirection {
        /// Direction of the PDO
        direction: PdoDirection,
    },
    /// The device has no such object
    #[snafu(display("Device has no object 0x{index:04X}.{sub}"))]
    UnknownObject {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
    },
    /// The declared width does not match the device's object
    #[snafu(display(
        "Object 0x{index:04X}.{sub} declared with {declared} bits, but the device reports {actual}"
    ))]
    WidthMismatch {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
        /// Width of the local variable
        declared: u8,
        /// Width reported by the device
        actual: u8,
    },
    /// The declared variables do not match the device's fixed mapping for the slot
    #[snafu(display("{direction} {slot} does not match the fixed mapping of {node}"))]
    FixedMappingMismatch {
        /// The node owning the slot
        node: NodeAddress,
        /// PDO direction
        direction: PdoDirection,
        /// The slot
        slot: u8,
    },
    /// Another PDO of the node already uses the slot
    #[snafu(display("{direction} {slot} of {node} is already registered"))]
    SlotInUse {
        /// The node owning the slot
        node: NodeAddress,
        /// PDO direction
        direction: PdoDirection,
        /// The slot
        slot: u8,
    },
    /// The network is closed or gone
    NetworkGone,
}

/// Errors returned by `transmit`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransmitError {
    /// The network reference could not be acquired
    ///
    /// The network was closed or dropped. Re-establishing it is up to the application.
    NetworkUnavailable,
    /// The PDO is not active
    #[snafu(display("PDO is not active (state {state:?})"))]
    NotActive {
        /// The state the PDO was in
        state: PdoState,
    },
    /// Only outgoing PDOs can be transmitted
    #[snafu(context(name(TransmitWrongDirectionSnafu)))]
    WrongDirection,
    /// The transport failed to send the frame
    #[snafu(display("Failed to send PDO: {source}"))]
    Send {
        /// The transport error
        source: TransportError,
    },
}

/// Errors returned by the blocking waits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum WaitError {
    /// The timeout elapsed before the condition was met
    Timeout,
}

/// Errors returned when opening a network
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OpenError {
    /// The cycle period must be greater than zero
    ZeroPeriod,
    /// The dispatch thread could not be started
    #[snafu(display("Failed to spawn dispatch thread: {source}"))]
    Spawn {
        /// The spawn error
        source: std::io::Error,
    },
}
