//! Handle for one device on a network
use std::sync::{Arc, Mutex, PoisonError};

use defmt_or_log::{debug, info};
use pdoflow_common::{
    nmt::NetworkState, node_id::NodeAddress, pdo::PdoDirection, traits::DeviceAccess, AtomicCell,
};

use crate::{
    error::ConfigError,
    network::{Network, NetworkRef},
    pdo::{PdoContainer, PdoState},
};

/// A device on a network, and the PDOs exchanged with it
///
/// The node tracks the device's network state. The state machine itself (NMT or ESM commands)
/// is driven by the application through its own protocol stack, which reports the outcome here
/// through [`start_node`](Self::start_node), [`stop_node`](Self::stop_node),
/// [`pre_op_node`](Self::pre_op_node) or [`set_state`](Self::set_state). PDOs of the node are
/// only exchanged while it is operational.
///
/// Dropping the node deactivates and unregisters its PDOs.
pub struct Node {
    address: NodeAddress,
    network: NetworkRef,
    device: Option<Arc<dyn DeviceAccess>>,
    state: AtomicCell<NetworkState>,
    pdos: Mutex<Vec<Arc<PdoContainer>>>,
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("verifies_mappings", &self.device.is_some())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create a node without object dictionary access
    ///
    /// PDOs bound to it are never verified against the device.
    pub fn new(network: &Network, address: NodeAddress) -> Result<Self, ConfigError> {
        Self::build(network, address, None)
    }

    /// Create a node which verifies PDO mappings against the device's object dictionary
    pub fn with_device(
        network: &Network,
        address: NodeAddress,
        device: Arc<dyn DeviceAccess>,
    ) -> Result<Self, ConfigError> {
        Self::build(network, address, Some(device))
    }

    fn build(
        network: &Network,
        address: NodeAddress,
        device: Option<Arc<dyn DeviceAccess>>,
    ) -> Result<Self, ConfigError> {
        if address.class() != network.class() {
            return Err(ConfigError::NodeClassMismatch {
                node: address,
                class: network.class(),
            });
        }
        Ok(Self {
            address,
            network: network.network_ref(),
            device,
            state: AtomicCell::new(NetworkState::PreOperational),
            pdos: Mutex::new(Vec::new()),
        })
    }

    /// The node's address
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    /// A weak reference to the network the node lives on
    pub fn network_ref(&self) -> NetworkRef {
        self.network.clone()
    }

    /// The last known network state of the device
    pub fn state(&self) -> NetworkState {
        self.state.load()
    }

    /// All PDOs bound to this node
    pub fn pdos(&self) -> Vec<Arc<PdoContainer>> {
        self.pdos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind a PDO to one of the node's slots and register it with the network
    ///
    /// This freezes the container's layout. If the container has fixed mapping verification
    /// enabled and the node has device access, every variable is looked up in the device's object
    /// dictionary and the layout is compared with the device's fixed mapping for the slot.
    ///
    /// The returned container is [`PdoState::Active`] right away if the node is operational,
    /// otherwise [`PdoState::Bound`].
    pub fn pdo_set(
        &self,
        slot: u8,
        mut pdo: PdoContainer,
    ) -> Result<Arc<PdoContainer>, ConfigError> {
        let Some(address) = pdo.address() else {
            return Err(ConfigError::MissingAddress);
        };
        let guard = self.network.acquire().ok_or(ConfigError::NetworkGone)?;
        if pdo.class() != guard.class() {
            return Err(ConfigError::AddressClassMismatch {
                address,
                class: guard.class(),
            });
        }
        if pdo.verify_fixed_mapping() {
            self.verify(slot, &pdo)?;
        }

        let shared = guard.shared();
        let mut registry = shared.lock_registry();
        if registry.slot_in_use(self.address, pdo.direction(), slot) {
            return Err(ConfigError::SlotInUse {
                node: self.address,
                direction: pdo.direction(),
                slot,
            });
        }

        pdo.set_owner(self.address, slot);
        let pdo = Arc::new(pdo);
        if self.state().is_operational() {
            pdo.set_state(PdoState::Active);
        } else {
            pdo.set_state(PdoState::Bound);
        }
        registry.register(pdo.clone());
        self.pdos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pdo.clone());

        info!(
            "Bound {} {} of {} at {} ({} bits, {:?})",
            pdo.direction(),
            slot,
            self.address,
            address,
            pdo.used_bits(),
            pdo.state()
        );
        Ok(pdo)
    }

    fn verify(&self, slot: u8, pdo: &PdoContainer) -> Result<(), ConfigError> {
        let Some(device) = &self.device else {
            debug!("{} has no device access, skipping mapping verification", self.address);
            return Ok(());
        };

        for var in pdo.vars() {
            let m = var.mapping();
            match device.object_info(m.index, m.sub) {
                None => {
                    return Err(ConfigError::UnknownObject {
                        index: m.index,
                        sub: m.sub,
                    })
                }
                Some(info) if info.bits != m.size => {
                    return Err(ConfigError::WidthMismatch {
                        index: m.index,
                        sub: m.sub,
                        declared: m.size,
                        actual: info.bits,
                    })
                }
                Some(_) => (),
            }
        }

        if let Some(fixed) = device.fixed_mapping(pdo.direction(), slot) {
            if fixed != pdo.mappings().as_slice() {
                return Err(ConfigError::FixedMappingMismatch {
                    node: self.address,
                    direction: pdo.direction(),
                    slot,
                });
            }
        }
        Ok(())
    }

    /// Record a new network state of the device
    ///
    /// Entering Operational activates all bound PDOs; leaving it deactivates them. The change
    /// is made with the registry locked, so it never races with a tick in progress.
    pub fn set_state(&self, state: NetworkState) {
        let prev = self.state.swap(state);
        if prev != state {
            info!("{}: {} -> {}", self.address, prev, state);
        }

        let apply = |pdo: &PdoContainer| match (state.is_operational(), pdo.state()) {
            (true, PdoState::Bound | PdoState::Inactive) => pdo.set_state(PdoState::Active),
            (false, PdoState::Active) => pdo.set_state(PdoState::Inactive),
            _ => (),
        };

        match self.network.acquire() {
            Some(guard) => {
                let registry = guard.shared().lock_registry();
                for pdo in registry.node_pdos(self.address) {
                    apply(pdo.as_ref());
                }
            }
            None => {
                // The network is gone and its PDOs are inactive already
                debug!("{}: state change with no network", self.address);
            }
        }
    }

    /// The device entered Operational
    pub fn start_node(&self) {
        self.set_state(NetworkState::Operational);
    }

    /// The device was stopped
    pub fn stop_node(&self) {
        self.set_state(NetworkState::Stopped);
    }

    /// The device entered PreOperational
    pub fn pre_op_node(&self) {
        self.set_state(NetworkState::PreOperational);
    }

    /// Look up a bound PDO by direction and slot
    pub fn pdo(&self, direction: PdoDirection, slot: u8) -> Option<Arc<PdoContainer>> {
        self.pdos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.direction() == direction && p.owner() == Some((self.address, slot)))
            .cloned()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(guard) = self.network.acquire() {
            guard.shared().lock_registry().remove_node(self.address);
        }
        for pdo in self
            .pdos
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            pdo.set_state(PdoState::Inactive);
        }
    }
}
