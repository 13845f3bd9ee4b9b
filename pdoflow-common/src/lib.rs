//! Common types shared among the pdoflow crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `pdoflow-engine`. Transport implementations outside of this workspace depend on it for the
//! [`Transport`](traits::Transport) and [`DeviceAccess`](traits::DeviceAccess) traits.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod constants;
pub mod messages;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod network_config;
pub mod nmt;
pub mod node_id;
pub mod pdo;
pub mod traits;

pub use messages::{CanId, NetworkClass, PdoAddress, PdoFrame};
pub use nmt::NetworkState;
pub use node_id::{CanNodeId, NodeAddress, PdoAddressError};
pub use pdo::{PdoDirection, PdoMapping, TransmissionType};
