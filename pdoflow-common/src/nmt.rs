//! Network states of a device
//!
//! CANopen devices move through the NMT states, EtherCAT devices through the ESM states. Both
//! state machines share the property pdoflow cares about: process data is only exchanged while
//! the device is operational.

/// Possible network states for a node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NetworkState {
    /// Initialising (CANopen boot-up, EtherCAT INIT)
    ///
    /// A CANopen node never remains in this state, as all nodes should transition automatically
    /// into PreOperational
    Init = 0,
    /// Node has been stopped
    Stopped = 4,
    /// Normal operational state
    Operational = 5,
    /// EtherCAT SAFE-OP: inputs are exchanged, outputs are held in a safe state
    SafeOperational = 6,
    /// Node is awaiting command to enter operation
    PreOperational = 127,
}

impl NetworkState {
    /// True when PDOs are exchanged in this state
    pub fn is_operational(&self) -> bool {
        *self == NetworkState::Operational
    }
}

impl core::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NetworkState::Init => write!(f, "Init"),
            NetworkState::Stopped => write!(f, "Stopped"),
            NetworkState::Operational => write!(f, "Operational"),
            NetworkState::SafeOperational => write!(f, "SafeOperational"),
            NetworkState::PreOperational => write!(f, "PreOperational"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// An error for [`NetworkState::try_from()`]
pub struct InvalidNetworkStateError(pub u8);

impl core::fmt::Display for InvalidNetworkStateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Invalid network state {}", self.0)
    }
}

impl core::error::Error for InvalidNetworkStateError {}

impl TryFrom<u8> for NetworkState {
    type Error = InvalidNetworkStateError;

    /// Convert a raw heartbeat state value
    ///
    /// Fails with InvalidNetworkStateError if value is not a valid state
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use NetworkState::*;
        match value {
            x if x == Init as u8 => Ok(Init),
            x if x == Stopped as u8 => Ok(Stopped),
            x if x == Operational as u8 => Ok(Operational),
            x if x == SafeOperational as u8 => Ok(SafeOperational),
            x if x == PreOperational as u8 => Ok(PreOperational),
            _ => Err(InvalidNetworkStateError(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_raw() {
        assert_eq!(Ok(NetworkState::Operational), NetworkState::try_from(5));
        assert_eq!(Ok(NetworkState::PreOperational), NetworkState::try_from(127));
        assert_eq!(Err(InvalidNetworkStateError(9)), NetworkState::try_from(9));
        assert!(!NetworkState::SafeOperational.is_operational());
    }
}
