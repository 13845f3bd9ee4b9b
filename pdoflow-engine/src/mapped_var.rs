//! Typed handles for process variables
//!
//! A process variable is one object dictionary entry carried in a PDO. The application keeps a
//! [`MappedVar`] (or an untyped [`DynVar`]) and reads or writes it from any thread; the dispatch
//! thread moves the value between the handle and the wire. Values are stored in a single atomic
//! word, so accessors never block and never tear.
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use pdoflow_common::pdo::PdoMapping;

use crate::error::ConfigError;
use crate::value::{sign_extend, width_mask, PdoValue};

const UNBOUND: u8 = u8::MAX;

/// Storage shared by all handles to one variable
#[derive(Debug)]
pub(crate) struct VarSlot {
    index: u16,
    sub: u8,
    bits: u8,
    signed: bool,
    value: AtomicU32,
    /// Byte offset inside the owning PDO, or UNBOUND
    offset: AtomicU8,
    mapped: AtomicBool,
}

impl VarSlot {
    fn new(index: u16, sub: u8, bits: u8, signed: bool) -> Self {
        Self {
            index,
            sub,
            bits,
            signed,
            value: AtomicU32::new(0),
            offset: AtomicU8::new(UNBOUND),
            mapped: AtomicBool::new(false),
        }
    }

    pub fn bytes(&self) -> usize {
        self.bits as usize / 8
    }

    pub fn load(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn store(&self, raw: u32) {
        self.value
            .store(raw & width_mask(self.bits), Ordering::Relaxed);
    }

    pub fn mapping(&self) -> PdoMapping {
        PdoMapping {
            index: self.index,
            sub: self.sub,
            size: self.bits,
        }
    }

    pub fn offset(&self) -> Option<usize> {
        match self.offset.load(Ordering::Acquire) {
            UNBOUND => None,
            offset => Some(offset as usize),
        }
    }

    /// Claim the variable for a PDO at the given byte offset
    ///
    /// Fails if another PDO already owns it.
    pub fn claim(&self, offset: usize) -> Result<(), ConfigError> {
        if self
            .mapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConfigError::AlreadyMapped {
                index: self.index,
                sub: self.sub,
            });
        }
        self.offset.store(offset as u8, Ordering::Release);
        Ok(())
    }

    /// Return the variable to the unmapped state when its PDO is dropped
    pub fn release(&self) {
        self.offset.store(UNBOUND, Ordering::Release);
        self.mapped.store(false, Ordering::Release);
    }

    /// Write the value little endian into `buf` at the bound offset
    pub fn encode(&self, buf: &mut [u8]) {
        if let Some(offset) = self.offset() {
            let bytes = self.load().to_le_bytes();
            let n = self.bytes();
            if let Some(dst) = buf.get_mut(offset..offset + n) {
                dst.copy_from_slice(&bytes[..n]);
            }
        }
    }

    /// Read the value from `buf` at the bound offset
    ///
    /// Returns false if `buf` is too short to contain the whole variable.
    pub fn decode(&self, buf: &[u8]) -> bool {
        let Some(offset) = self.offset() else {
            return false;
        };
        let n = self.bytes();
        match buf.get(offset..offset + n) {
            Some(src) => {
                let mut bytes = [0u8; 4];
                bytes[..n].copy_from_slice(src);
                self.store(u32::from_le_bytes(bytes));
                true
            }
            None => false,
        }
    }
}

fn check_width(index: u16, sub: u8, bits: u8) -> Result<(), ConfigError> {
    match bits {
        8 | 16 | 32 => Ok(()),
        _ => Err(ConfigError::InvalidWidth { index, sub, bits }),
    }
}

/// A typed handle to a process variable
///
/// Cloning the handle is cheap; all clones refer to the same value.
///
/// ```
/// use pdoflow_engine::MappedVar;
///
/// let target_velocity = MappedVar::<i32>::new(0x60FF, 0);
/// target_velocity.write(-1000);
/// assert_eq!(-1000, target_velocity.read());
/// ```
pub struct MappedVar<T: PdoValue> {
    slot: Arc<VarSlot>,
    _value: PhantomData<T>,
}

impl<T: PdoValue> MappedVar<T> {
    /// Create a variable for the object at `index`/`sub`
    ///
    /// The object is checked against the device's object dictionary when the PDO holding it is
    /// bound with mapping verification enabled.
    pub fn new(index: u16, sub: u8) -> Self {
        Self {
            slot: Arc::new(VarSlot::new(index, sub, T::BITS, T::SIGNED)),
            _value: PhantomData,
        }
    }

    /// Read the most recent value
    pub fn read(&self) -> T {
        T::from_bits(self.slot.load())
    }

    /// Store a value for the next transmission
    pub fn write(&self, value: T) {
        self.slot.store(value.to_bits());
    }

    /// The object index
    pub fn index(&self) -> u16 {
        self.slot.index
    }

    /// The object sub index
    pub fn sub(&self) -> u8 {
        self.slot.sub
    }

    /// Byte offset inside the owning PDO, or None while unmapped
    pub fn offset(&self) -> Option<usize> {
        self.slot.offset()
    }

    /// The mapping entry describing this variable
    pub fn mapping(&self) -> PdoMapping {
        self.slot.mapping()
    }

    /// Get an untyped handle to the same variable
    pub fn as_dyn(&self) -> DynVar {
        DynVar {
            slot: self.slot.clone(),
        }
    }
}

impl<T: PdoValue> Clone for MappedVar<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: PdoValue + core::fmt::Debug> core::fmt::Debug for MappedVar<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedVar")
            .field("index", &self.slot.index)
            .field("sub", &self.slot.sub)
            .field("offset", &self.offset())
            .field("value", &self.read())
            .finish()
    }
}

/// An untyped handle to a process variable
///
/// Used where the width of a variable is only known at run time, e.g. for PDOs built from a
/// configuration file.
#[derive(Clone, Debug)]
pub struct DynVar {
    slot: Arc<VarSlot>,
}

impl DynVar {
    /// Create a variable of `bits` width
    pub fn new(index: u16, sub: u8, bits: u8, signed: bool) -> Result<Self, ConfigError> {
        check_width(index, sub, bits)?;
        Ok(Self {
            slot: Arc::new(VarSlot::new(index, sub, bits, signed)),
        })
    }

    /// Create an unsigned variable from a mapping entry
    pub fn from_mapping(mapping: &PdoMapping) -> Result<Self, ConfigError> {
        Self::new(mapping.index, mapping.sub, mapping.size, false)
    }

    /// Read the raw value, zero extended
    pub fn read_raw(&self) -> u32 {
        self.slot.load()
    }

    /// Read the value, sign extended for signed variables
    pub fn read_i64(&self) -> i64 {
        let raw = self.slot.load();
        if self.slot.signed {
            sign_extend(raw, self.slot.bits)
        } else {
            raw as i64
        }
    }

    /// Store a raw value; bits above the variable's width are dropped
    pub fn write_raw(&self, raw: u32) {
        self.slot.store(raw);
    }

    /// Width in bits
    pub fn bits(&self) -> u8 {
        self.slot.bits
    }

    /// Byte offset inside the owning PDO, or None while unmapped
    pub fn offset(&self) -> Option<usize> {
        self.slot.offset()
    }

    /// The mapping entry describing this variable
    pub fn mapping(&self) -> PdoMapping {
        self.slot.mapping()
    }

    /// Get a typed handle to the same variable
    ///
    /// Returns None if the widths or signedness differ.
    pub fn typed<T: PdoValue>(&self) -> Option<MappedVar<T>> {
        if T::BITS == self.slot.bits && T::SIGNED == self.slot.signed {
            Some(MappedVar {
                slot: self.slot.clone(),
                _value: PhantomData,
            })
        } else {
            None
        }
    }

    pub(crate) fn slot(&self) -> &Arc<VarSlot> {
        &self.slot
    }
}

impl<T: PdoValue> From<&MappedVar<T>> for DynVar {
    fn from(value: &MappedVar<T>) -> Self {
        value.as_dyn()
    }
}

impl<T: PdoValue> From<MappedVar<T>> for DynVar {
    fn from(value: MappedVar<T>) -> Self {
        DynVar { slot: value.slot }
    }
}

impl From<&DynVar> for DynVar {
    fn from(value: &DynVar) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let var = MappedVar::<i16>::new(0x6041, 0);
        var.write(-2);
        assert_eq!(-2, var.read());
        assert_eq!(0xFFFE, var.as_dyn().read_raw());
        assert_eq!(-2, var.as_dyn().read_i64());
        assert_eq!(None, var.offset());
    }

    #[test]
    fn test_dyn_width() {
        assert!(matches!(
            DynVar::new(0x2000, 1, 12, false),
            Err(ConfigError::InvalidWidth { bits: 12, .. })
        ));
        let var = DynVar::new(0x2000, 1, 8, false).unwrap();
        var.write_raw(0x1234);
        assert_eq!(0x34, var.read_raw());
        assert!(var.typed::<u8>().is_some());
        assert!(var.typed::<i8>().is_none());
    }

    #[test]
    fn test_claim_once() {
        let var = MappedVar::<u32>::new(0x6064, 0);
        var.as_dyn().slot().claim(0).unwrap();
        assert_eq!(
            Err(ConfigError::AlreadyMapped {
                index: 0x6064,
                sub: 0
            }),
            var.as_dyn().slot().claim(4)
        );
        assert_eq!(Some(0), var.offset());
        var.as_dyn().slot().release();
        assert_eq!(None, var.offset());
    }
}
