pub mod sim_bus;
pub mod sim_device;
pub mod utils;

pub mod prelude {
    pub use super::sim_bus::{SimBus, SimBusReceiver};
    pub use super::sim_device::SimDevice;
    pub use super::utils::{init_logging, run_ticks};
    pub use pdoflow_common::{
        CanId, CanNodeId, NetworkClass, NodeAddress, PdoAddress, PdoDirection, PdoFrame,
        PdoMapping, TransmissionType,
    };
    pub use pdoflow_engine::{
        ConfigError, Event, EventSignal, MappedVar, Network, NetworkOptions, Node, PdoContainer,
        PdoState, TransmitError, WaitError,
    };
}
