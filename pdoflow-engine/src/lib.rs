//! A cyclic process data engine for CANopen and EtherCAT masters
//!
//! pdoflow maps typed process variables into PDOs, exchanges them on a fixed cycle from a
//! dedicated dispatch thread, and hands fresh data to application threads. It does not implement
//! the fieldbus itself: frames go out through a [`Transport`](common::traits::Transport), and
//! come back in through [`Network::deliver`].
//!
//! The pieces, leaf first:
//!
//! * [`MappedVar`] and [`DynVar`] are handles to process variables. Reading and writing them
//!   never blocks, from any thread.
//! * [`PdoContainer`] is an ordered set of variables forming one datagram, with a network
//!   address and a [`TransmissionType`](common::TransmissionType). Incoming containers can carry
//!   a [`ReceiveHook`].
//! * [`Node`] binds containers to a device's PDO slots, optionally verifying them against the
//!   device's object dictionary, and activates them while the device is operational.
//! * [`Network`] owns the dispatch thread. Each tick it decodes received PDOs and runs their
//!   hooks, then sends the outgoing PDOs that are due.
//! * [`EventSignal`] is the bit mask through which hooks wake application threads.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pdoflow_engine::common::{
//!     traits::{Transport, TransportError},
//!     CanNodeId, NetworkClass, NodeAddress, PdoFrame, TransmissionType,
//! };
//! use pdoflow_engine::{
//!     Event, EventSignal, MappedVar, Network, NetworkOptions, Node, PdoContainer,
//! };
//!
//! struct NullTransport;
//! impl Transport for NullTransport {
//!     fn send(&self, _frame: &PdoFrame) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! let network = Network::open(
//!     Arc::new(NullTransport),
//!     NetworkOptions::new(NetworkClass::Can, Duration::from_millis(2)),
//! )
//! .unwrap();
//! let drive = NodeAddress::Can(CanNodeId::new(1).unwrap());
//! let node = Node::new(&network, drive).unwrap();
//!
//! // Outgoing: target velocity, sent every cycle
//! let target_velocity = MappedVar::<i32>::new(0x60FF, 0);
//! let mut rpdo = PdoContainer::outgoing(NetworkClass::Can);
//! rpdo.init(drive.rpdo_address(1).unwrap()).unwrap();
//! rpdo.add_var(&target_velocity).unwrap();
//! rpdo.set_type(TransmissionType::Cyclic(1));
//! node.pdo_set(1, rpdo).unwrap();
//!
//! // Incoming: actual position, signalling bit 0 on arrival
//! let signal = Arc::new(EventSignal::new());
//! let position = MappedVar::<i32>::new(0x6064, 0);
//! let mut tpdo = PdoContainer::incoming(NetworkClass::Can);
//! tpdo.init(drive.tpdo_address(1).unwrap()).unwrap();
//! tpdo.add_var(&position).unwrap();
//! let hook_signal = signal.clone();
//! tpdo.set_received(move |_: &PdoContainer| hook_signal.set_bits(1)).unwrap();
//! node.pdo_set(1, tpdo).unwrap();
//!
//! node.start_node();
//! target_velocity.write(500);
//!
//! // Nothing answers on this transport, so the wait times out
//! signal.clear_bits(1);
//! assert!(Event::Any(1).wait(&signal, Some(Duration::from_millis(10))).is_err());
//! ```
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bits;
mod dispatch;
mod error;
mod event;
mod mapped_var;
mod network;
mod node;
mod pdo;
#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub mod socketcan;
mod value;

pub use pdoflow_common as common;

pub use bits::BitField;
pub use error::{ConfigError, OpenError, TransmitError, WaitError};
pub use event::{Event, EventSignal};
pub use mapped_var::{DynVar, MappedVar};
pub use network::{
    DispatchStats, Network, NetworkGuard, NetworkOptions, NetworkRef, SyncMode,
    DISPATCH_THREAD_NAME,
};
pub use node::Node;
pub use pdo::{ConfiguredPdo, PdoContainer, PdoState, ReceiveHook, MAX_PDO_VARS};
pub use value::PdoValue;
