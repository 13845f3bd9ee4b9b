//! Constants defining standard object indices and CAN identifiers
//!
//!

/// Object indices for standard objects
pub mod object_ids {
    /// The first RPDO communication parameter index. RPDO comm can be stored from 0x1400 to 0x15FF.
    pub const RPDO_COMM_BASE: u16 = 0x1400;
    ///  The first RPDO mapping parameter index. RPDO mappings can be stored from 0x1600 to 0x17FF;
    pub const RPDO_MAP_BASE: u16 = 0x1600;
    /// The first TPDO communication parameter index. TPDO comms can be stored from 0x1800 to 0x19FF.
    pub const TPDO_COMM_BASE: u16 = 0x1800;
    ///  The first TPDO mapping parameter index. TPDO mappings can be stored from 0x1A00 to 0x1BFF;
    pub const TPDO_MAP_BASE: u16 = 0x1A00;
    /// EtherCAT sync manager 2 (outputs) PDO assignment
    pub const SM2_PDO_ASSIGN: u16 = 0x1C12;
    /// EtherCAT sync manager 3 (inputs) PDO assignment
    pub const SM3_PDO_ASSIGN: u16 = 0x1C13;

    /// Drive control word
    pub const CONTROL_WORD: u16 = 0x6040;
    /// Drive status word
    pub const STATUS_WORD: u16 = 0x6041;
    /// Requested mode of operation
    pub const MODE_OF_OPERATION: u16 = 0x6060;
    /// Mode of operation currently active
    pub const MODE_OF_OPERATION_DISPLAY: u16 = 0x6061;
    /// Actual position, in counts
    pub const POSITION_ACTUAL: u16 = 0x6064;
    /// Actual velocity, in 0.1 counts/s
    pub const VELOCITY_ACTUAL: u16 = 0x606C;
    /// Target position for profile position mode
    pub const TARGET_POSITION: u16 = 0x607A;
    /// Digital input states
    pub const DIGITAL_INPUTS: u16 = 0x60FD;
    /// Digital output states
    pub const DIGITAL_OUTPUTS: u16 = 0x60FE;
    /// Target velocity for profile velocity mode
    pub const TARGET_VELOCITY: u16 = 0x60FF;
}

/// Well known CAN identifiers
pub mod cob_ids {
    /// The SYNC broadcast COB-ID
    pub const SYNC: u16 = 0x80;
    /// Function code of the first TPDO (device to master). Following TPDOs add 0x100 per slot.
    pub const TPDO_BASE: u16 = 0x180;
    /// Function code of the first RPDO (master to device). Following RPDOs add 0x100 per slot.
    pub const RPDO_BASE: u16 = 0x200;
    /// Number of PDO slots addressable with the predefined connection set
    pub const PREDEFINED_SLOTS: u8 = 4;
}
