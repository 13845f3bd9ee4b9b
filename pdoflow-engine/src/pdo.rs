//! PDO containers
//!
//! A [`PdoContainer`] is an ordered list of process variables forming one datagram. The order in
//! which variables are added defines the wire layout: each variable takes the next free bytes,
//! little endian. Containers are configured while owned by the application, then handed to
//! [`Node::pdo_set`](crate::Node::pdo_set), which freezes their layout and registers them with the
//! network.
use std::panic::{catch_unwind, AssertUnwindSafe};

use defmt_or_log::error;
use pdoflow_common::{
    messages::{NetworkClass, PdoAddress, PdoFrame, MAX_PDO_BYTES},
    network_config::PdoDefaultConfig,
    node_id::NodeAddress,
    pdo::{PdoDirection, PdoMapping, TransmissionType},
    AtomicCell,
};
use snafu::ResultExt;

use crate::{
    bits::{group_mappings, BitField, MappingGroup},
    error::{ConfigError, InvalidAddressSnafu, SendSnafu, TransmitError},
    mapped_var::DynVar,
    network::NetworkRef,
};

/// The largest number of variables in one PDO (32 bytes of 8-bit objects)
pub const MAX_PDO_VARS: usize = MAX_PDO_BYTES;

/// Lifecycle of a PDO container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PdoState {
    /// Being configured; not registered with a node
    Unbound,
    /// Registered with a node which is not operational yet
    Bound,
    /// Exchanged every cycle
    Active,
    /// The node was stopped, left operational, or was dropped, or the network closed
    Inactive,
}

/// Callback run by the dispatch thread after an incoming PDO was decoded
///
/// The hook runs on the shared dispatch thread while it holds the PDO registry. It must return
/// quickly, must not block, and must not call back into node or network configuration. The
/// usual hook sets a bit in an [`EventSignal`](crate::EventSignal). Panics are caught, logged
/// and counted; they never stop the dispatch thread.
pub trait ReceiveHook: Send + Sync {
    /// Called once per decoded datagram
    fn received(&self, pdo: &PdoContainer);
}

impl<F> ReceiveHook for F
where
    F: Fn(&PdoContainer) + Send + Sync,
{
    fn received(&self, pdo: &PdoContainer) {
        self(pdo)
    }
}

/// One PDO: an ordered set of mapped variables plus the policy of when it moves on the wire
pub struct PdoContainer {
    direction: PdoDirection,
    class: NetworkClass,
    address: Option<PdoAddress>,
    transmission_type: TransmissionType,
    verify_fixed_mapping: bool,
    vars: heapless::Vec<DynVar, MAX_PDO_VARS>,
    used_bits: usize,
    hook: Option<Box<dyn ReceiveHook>>,
    owner: Option<(NodeAddress, u8)>,
    state: AtomicCell<PdoState>,
    /// Latest incoming frame not yet decoded
    buffered_frame: AtomicCell<Option<PdoFrame>>,
    /// Ticks since the last cyclic transmission
    sync_count: AtomicCell<u8>,
    /// A SyncAcyclic transmission was requested for the next tick
    acyclic_pending: AtomicCell<bool>,
    received_count: AtomicCell<u32>,
}

impl core::fmt::Debug for PdoContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PdoContainer")
            .field("direction", &self.direction)
            .field("class", &self.class)
            .field("address", &self.address)
            .field("transmission_type", &self.transmission_type)
            .field("mappings", &self.mappings())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PdoContainer {
    /// Create an empty container
    ///
    /// The class sets the capacity: 64 bits for CAN, 256 bits for EtherCAT.
    pub fn new(direction: PdoDirection, class: NetworkClass) -> Self {
        Self {
            direction,
            class,
            address: None,
            transmission_type: TransmissionType::default(),
            verify_fixed_mapping: true,
            vars: heapless::Vec::new(),
            used_bits: 0,
            hook: None,
            owner: None,
            state: AtomicCell::new(PdoState::Unbound),
            buffered_frame: AtomicCell::new(None),
            sync_count: AtomicCell::new(0),
            acyclic_pending: AtomicCell::new(false),
            received_count: AtomicCell::new(0),
        }
    }

    /// Create an outgoing container (an RPDO of the device)
    pub fn outgoing(class: NetworkClass) -> Self {
        Self::new(PdoDirection::Outgoing, class)
    }

    /// Create an incoming container (a TPDO of the device)
    pub fn incoming(class: NetworkClass) -> Self {
        Self::new(PdoDirection::Incoming, class)
    }

    /// Assign the network address
    ///
    /// Two active containers with the same address on one network are not detected as an error;
    /// the last one sent wins on the wire.
    pub fn init(&mut self, address: PdoAddress) -> Result<(), ConfigError> {
        if !address.matches_class(self.class) {
            return Err(ConfigError::AddressClassMismatch {
                address,
                class: self.class,
            });
        }
        self.address = Some(address);
        Ok(())
    }

    /// Append a variable
    ///
    /// The variable is placed at the next free byte. Fails with
    /// [`ConfigError::CapacityExceeded`] if it does not fit, and with
    /// [`ConfigError::AlreadyMapped`] if it belongs to another container.
    pub fn add_var(&mut self, var: impl Into<DynVar>) -> Result<(), ConfigError> {
        let var = var.into();
        let mapping = var.mapping();
        let capacity = self.class.capacity_bits();
        let needed = mapping.size as usize;
        if self.used_bits + needed > capacity || self.vars.is_full() {
            return Err(ConfigError::CapacityExceeded {
                index: mapping.index,
                sub: mapping.sub,
                needed,
                available: capacity - self.used_bits,
                capacity,
            });
        }
        var.slot().claim(self.used_bits / 8)?;
        self.used_bits += needed;
        // Cannot fail, fullness was checked above
        let _ = self.vars.push(var);
        Ok(())
    }

    /// Set when the PDO is transmitted (or expected)
    ///
    /// `Cyclic(n)` is clamped to the CANopen range 1..=240: `Cyclic(0)` behaves as `Cyclic(1)`.
    pub fn set_type(&mut self, transmission_type: TransmissionType) {
        self.transmission_type = match transmission_type {
            TransmissionType::Cyclic(n) => TransmissionType::Cyclic(n.clamp(1, 240)),
            other => other,
        };
    }

    /// Enable or disable the comparison against the device's fixed mapping when binding
    ///
    /// Enabled by default. Devices with mixed width, non byte aligned fixed mappings must disable
    /// it, as their packed words cannot be compared entry by entry.
    pub fn set_verify_fixed_mapping(&mut self, verify: bool) {
        self.verify_fixed_mapping = verify;
    }

    /// Install the receive hook of an incoming container
    pub fn set_received(&mut self, hook: impl ReceiveHook + 'static) -> Result<(), ConfigError> {
        if self.direction != PdoDirection::Incoming {
            return Err(ConfigError::WrongDirection {
                direction: self.direction,
            });
        }
        self.hook = Some(Box::new(hook));
        Ok(())
    }

    /// Build a container and its variables from a configuration entry
    ///
    /// Byte aligned objects get one variable each. Runs of sub-byte objects are grouped into
    /// 16-bit words, each mapped as one variable; use [`ConfiguredPdo::field`] to reach the bits.
    pub fn from_config(
        direction: PdoDirection,
        class: NetworkClass,
        node: NodeAddress,
        slot: u8,
        config: &PdoDefaultConfig,
    ) -> Result<ConfiguredPdo, ConfigError> {
        let mut container = PdoContainer::new(direction, class);
        let address = config
            .address(node, direction, slot)
            .context(InvalidAddressSnafu {
                node,
                direction,
                slot,
            })?;
        container.init(address)?;
        container.set_type(config.transmission_type);
        container.set_verify_fixed_mapping(config.verify_fixed_mapping);

        let groups = group_mappings(&config.mappings)?;
        let mut vars = Vec::with_capacity(groups.len());
        for group in &groups {
            let var = DynVar::from_mapping(&group.word_mapping())?;
            container.add_var(&var)?;
            vars.push(var);
        }
        Ok(ConfiguredPdo {
            container,
            vars,
            groups,
        })
    }

    /// Direction of the PDO
    pub fn direction(&self) -> PdoDirection {
        self.direction
    }

    /// The network class the PDO was created for
    pub fn class(&self) -> NetworkClass {
        self.class
    }

    /// The network address, once assigned
    pub fn address(&self) -> Option<PdoAddress> {
        self.address
    }

    /// The transmission type
    pub fn transmission_type(&self) -> TransmissionType {
        self.transmission_type
    }

    /// Whether the fixed mapping is verified when binding
    pub fn verify_fixed_mapping(&self) -> bool {
        self.verify_fixed_mapping
    }

    /// Current lifecycle state
    pub fn state(&self) -> PdoState {
        self.state.load()
    }

    /// The node and slot the PDO is bound to
    pub fn owner(&self) -> Option<(NodeAddress, u8)> {
        self.owner
    }

    /// The mapped variables, in wire order
    pub fn vars(&self) -> &[DynVar] {
        &self.vars
    }

    /// The mapping entries of all variables, in wire order
    ///
    /// This is the list to program into the device's mapping parameter objects.
    pub fn mappings(&self) -> Vec<PdoMapping> {
        self.vars.iter().map(|v| v.mapping()).collect()
    }

    /// Number of mapped bits
    pub fn used_bits(&self) -> usize {
        self.used_bits
    }

    /// Payload length in bytes
    pub fn len_bytes(&self) -> usize {
        self.used_bits.div_ceil(8)
    }

    /// Number of datagrams decoded since the container was activated
    pub fn received_count(&self) -> u32 {
        self.received_count.load()
    }

    /// Write the current value of every variable into `buf`
    ///
    /// Returns the number of payload bytes. Variables which do not fit into `buf` are skipped.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let len = self.len_bytes().min(buf.len());
        buf[..len].fill(0);
        for var in &self.vars {
            var.slot().encode(&mut buf[..len]);
        }
        len
    }

    /// Update the variables from a received payload
    ///
    /// A short payload updates only the variables it fully contains. Returns the number of
    /// variables updated.
    pub fn decode(&self, data: &[u8]) -> usize {
        self.vars
            .iter()
            .filter(|var| var.slot().decode(data))
            .count()
    }

    /// Send the PDO with the current variable values
    ///
    /// Only valid on outgoing containers in the [`PdoState::Active`] state. SyncAcyclic
    /// containers are queued for the next tick instead of sent immediately.
    ///
    /// The network is acquired for the duration of the call; if it has been closed or dropped
    /// this returns [`TransmitError::NetworkUnavailable`].
    pub fn transmit(&self, network: &NetworkRef) -> Result<(), TransmitError> {
        if self.direction != PdoDirection::Outgoing {
            return Err(TransmitError::WrongDirection);
        }
        let guard = network
            .acquire()
            .ok_or(TransmitError::NetworkUnavailable)?;
        let state = self.state();
        if state != PdoState::Active {
            return Err(TransmitError::NotActive { state });
        }
        if self.transmission_type == TransmissionType::SyncAcyclic {
            self.acyclic_pending.store(true);
            return Ok(());
        }
        match self.frame() {
            Some(frame) => guard.send(&frame).context(SendSnafu),
            None => Err(TransmitError::NotActive { state }),
        }
    }

    /// Encode the PDO into a frame, if it has an address
    pub(crate) fn frame(&self) -> Option<PdoFrame> {
        let address = self.address?;
        let mut buf = [0u8; MAX_PDO_BYTES];
        let len = self.encode(&mut buf);
        PdoFrame::new(address, &buf[..len]).ok()
    }

    pub(crate) fn set_owner(&mut self, node: NodeAddress, slot: u8) {
        self.owner = Some((node, slot));
    }

    /// Change state, resetting the cycle bookkeeping when becoming active
    ///
    /// Called with the registry lock held.
    pub(crate) fn set_state(&self, state: PdoState) {
        if state == PdoState::Active && self.state() != PdoState::Active {
            self.sync_count.store(0);
            self.acyclic_pending.store(false);
            self.buffered_frame.store(None);
            self.received_count.store(0);
        }
        self.state.store(state);
    }

    /// Keep an incoming frame until the dispatch thread decodes it
    ///
    /// Returns true if an older, undecoded frame was replaced.
    pub(crate) fn buffer_frame(&self, frame: PdoFrame) -> bool {
        self.buffered_frame.swap(Some(frame)).is_some()
    }

    /// Decode the buffered frame, if any, and run the receive hook
    ///
    /// Returns Some(false) if the hook panicked, Some(true) if a frame was processed.
    pub(crate) fn process_received(&self) -> Option<bool> {
        let frame = self.buffered_frame.take()?;
        self.decode(frame.data());
        self.received_count.update(|n| n.wrapping_add(1));
        let Some(hook) = &self.hook else {
            return Some(true);
        };
        match catch_unwind(AssertUnwindSafe(|| hook.received(self))) {
            Ok(()) => Some(true),
            Err(_) => {
                error!(
                    "Receive hook of {:?} panicked, continuing with the next PDO",
                    self.address
                );
                Some(false)
            }
        }
    }

    /// Advance the cycle counter; true if an outgoing transmission is due this tick
    pub(crate) fn tick_due(&self) -> bool {
        match self.transmission_type {
            TransmissionType::Cyclic(n) => {
                let count = self.sync_count.load().saturating_add(1);
                if count >= n {
                    self.sync_count.store(0);
                    true
                } else {
                    self.sync_count.store(count);
                    false
                }
            }
            TransmissionType::SyncAcyclic => self.acyclic_pending.swap(false),
            TransmissionType::Event | TransmissionType::OnRequest => false,
        }
    }

    pub(crate) fn is_active(&self, direction: PdoDirection) -> bool {
        self.direction == direction && self.state() == PdoState::Active
    }
}

impl Drop for PdoContainer {
    fn drop(&mut self) {
        for var in &self.vars {
            var.slot().release();
        }
    }
}

/// A container built from configuration, with handles to its variables
#[derive(Debug)]
pub struct ConfiguredPdo {
    /// The container, ready for [`Node::pdo_set`](crate::Node::pdo_set)
    pub container: PdoContainer,
    /// One variable per mapping group, in wire order
    pub vars: Vec<DynVar>,
    /// The mapping groups the variables were built from
    pub groups: Vec<MappingGroup>,
}

impl ConfiguredPdo {
    /// Find the variable carrying a byte aligned object
    pub fn var(&self, index: u16, sub: u8) -> Option<&DynVar> {
        self.groups
            .iter()
            .zip(&self.vars)
            .find(|(g, _)| matches!(g, MappingGroup::Whole(m) if m.index == index && m.sub == sub))
            .map(|(_, v)| v)
    }

    /// Find the packed word and bit position of an object
    pub fn field(&self, index: u16, sub: u8) -> Option<(&DynVar, BitField)> {
        self.groups
            .iter()
            .zip(&self.vars)
            .find_map(|(g, v)| match g {
                MappingGroup::Packed { fields, .. } => fields
                    .iter()
                    .find(|(m, _)| m.index == index && m.sub == sub)
                    .map(|(_, f)| (v, *f)),
                MappingGroup::Whole(_) => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use pdoflow_common::messages::CanId;

    use super::*;
    use crate::MappedVar;

    #[test]
    fn test_layout_follows_insertion_order() {
        let mut pdo = PdoContainer::incoming(NetworkClass::EtherCat);
        let position = MappedVar::<i32>::new(0x6064, 0);
        let status = MappedVar::<u16>::new(0x6041, 0);
        pdo.add_var(&position).unwrap();
        pdo.add_var(&status).unwrap();
        assert_eq!(Some(0), position.offset());
        assert_eq!(Some(4), status.offset());
        assert_eq!(6, pdo.len_bytes());
    }

    #[test]
    fn test_can_capacity() {
        let mut pdo = PdoContainer::outgoing(NetworkClass::Can);
        pdo.add_var(MappedVar::<u32>::new(0x607A, 0)).unwrap();
        pdo.add_var(MappedVar::<u16>::new(0x6040, 0)).unwrap();
        let err = pdo.add_var(MappedVar::<u32>::new(0x60FF, 0)).unwrap_err();
        assert_eq!(
            ConfigError::CapacityExceeded {
                index: 0x60FF,
                sub: 0,
                needed: 32,
                available: 16,
                capacity: 64
            },
            err
        );
        assert_eq!(48, pdo.used_bits());
    }

    #[test]
    fn test_var_mapped_once() {
        let var = MappedVar::<i32>::new(0x6064, 0);
        let mut a = PdoContainer::incoming(NetworkClass::Can);
        let mut b = PdoContainer::incoming(NetworkClass::Can);
        a.add_var(&var).unwrap();
        assert!(matches!(
            b.add_var(&var),
            Err(ConfigError::AlreadyMapped { index: 0x6064, .. })
        ));
        drop(a);
        // Dropping the owner frees the variable
        b.add_var(&var).unwrap();
    }

    #[test]
    fn test_short_payload() {
        let mut pdo = PdoContainer::incoming(NetworkClass::Can);
        let a = MappedVar::<u16>::new(0x2000, 1);
        let b = MappedVar::<u32>::new(0x2000, 2);
        pdo.add_var(&a).unwrap();
        pdo.add_var(&b).unwrap();
        assert_eq!(1, pdo.decode(&[0x34, 0x12, 0x01]));
        assert_eq!(0x1234, a.read());
        assert_eq!(0, b.read());
    }

    #[test]
    fn test_address_class() {
        let mut pdo = PdoContainer::outgoing(NetworkClass::EtherCat);
        assert!(matches!(
            pdo.init(PdoAddress::Cob(CanId::std(0x201))),
            Err(ConfigError::AddressClassMismatch { .. })
        ));
        assert!(matches!(
            pdo.set_received(|_: &PdoContainer| {}),
            Err(ConfigError::WrongDirection { .. })
        ));
    }

    #[test]
    fn test_cyclic_counter() {
        let mut pdo = PdoContainer::outgoing(NetworkClass::Can);
        pdo.set_type(TransmissionType::Cyclic(3));
        let due: Vec<bool> = (0..7).map(|_| pdo.tick_due()).collect();
        assert_eq!(vec![false, false, true, false, false, true, false], due);
    }

    #[test]
    fn test_cyclic_range_clamped() {
        let mut pdo = PdoContainer::outgoing(NetworkClass::Can);
        pdo.set_type(TransmissionType::Cyclic(0));
        assert_eq!(TransmissionType::Cyclic(1), pdo.transmission_type());
        assert!(pdo.tick_due());
        assert!(pdo.tick_due());

        pdo.set_type(TransmissionType::Cyclic(250));
        assert_eq!(TransmissionType::Cyclic(240), pdo.transmission_type());
        assert_eq!(240, pdo.transmission_type().to_raw());
    }

    #[test]
    fn test_from_config_rejects_unaddressable_slot() {
        let node = NodeAddress::Can(pdoflow_common::CanNodeId::new(1).unwrap());
        let config = PdoDefaultConfig {
            cob_id: None,
            extended: false,
            add_node_id: false,
            transmission_type: TransmissionType::Cyclic(1),
            verify_fixed_mapping: false,
            mappings: vec![PdoMapping {
                index: 0x60FF,
                sub: 0,
                size: 32,
            }],
        };
        let result = PdoContainer::from_config(
            PdoDirection::Outgoing,
            NetworkClass::Can,
            node,
            255,
            &config,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAddress {
                slot: 255,
                source: pdoflow_common::PdoAddressError::SlotOutOfRange { slot: 255 },
                ..
            })
        ));

        let configured =
            PdoContainer::from_config(PdoDirection::Outgoing, NetworkClass::Can, node, 1, &config)
                .unwrap();
        assert_eq!(
            Some(PdoAddress::Cob(CanId::Std(0x301))),
            configured.container.address()
        );
    }
}
