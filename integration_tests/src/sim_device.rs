use std::collections::HashMap;

use pdoflow_common::constants::object_ids;
use pdoflow_common::pdo::{PdoDirection, PdoMapping};
use pdoflow_common::traits::{DeviceAccess, ObjectInfo};

/// A device object dictionary for mapping verification
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    objects: HashMap<(u16, u8), u8>,
    fixed: HashMap<(PdoDirection, u8), Vec<PdoMapping>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A servo drive with the CiA 402 objects used by the tests
    pub fn drive() -> Self {
        Self::new()
            .with_object(object_ids::CONTROL_WORD, 0, 16)
            .with_object(object_ids::STATUS_WORD, 0, 16)
            .with_object(object_ids::MODE_OF_OPERATION, 0, 8)
            .with_object(object_ids::MODE_OF_OPERATION_DISPLAY, 0, 8)
            .with_object(object_ids::POSITION_ACTUAL, 0, 32)
            .with_object(object_ids::VELOCITY_ACTUAL, 0, 32)
            .with_object(object_ids::TARGET_POSITION, 0, 32)
            .with_object(object_ids::TARGET_VELOCITY, 0, 32)
            .with_object(object_ids::DIGITAL_INPUTS, 0, 32)
    }

    pub fn with_object(mut self, index: u16, sub: u8, bits: u8) -> Self {
        self.objects.insert((index, sub), bits);
        self
    }

    pub fn with_fixed_mapping(
        mut self,
        direction: PdoDirection,
        slot: u8,
        mappings: Vec<PdoMapping>,
    ) -> Self {
        self.fixed.insert((direction, slot), mappings);
        self
    }
}

impl DeviceAccess for SimDevice {
    fn object_info(&self, index: u16, sub: u8) -> Option<ObjectInfo> {
        self.objects
            .get(&(index, sub))
            .map(|&bits| ObjectInfo { bits })
    }

    fn fixed_mapping(&self, direction: PdoDirection, slot: u8) -> Option<&[PdoMapping]> {
        self.fixed.get(&(direction, slot)).map(|m| m.as_slice())
    }
}
