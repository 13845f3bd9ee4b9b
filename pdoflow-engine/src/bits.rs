//! Sub-byte objects packed into 16-bit words
//!
//! Some devices (digital I/O couplers in particular) map single bits and short bit strings into
//! their PDOs. Such runs always fill whole 16-bit words, with fields packed from bit 0 upwards in
//! mapping order. The engine maps each word as one 16-bit variable named after the first object of
//! the run, and the application picks the fields out of it with a [`BitField`].
use pdoflow_common::pdo::PdoMapping;

use crate::error::ConfigError;

/// Width of the words sub-byte fields are packed into
pub const PACKED_WORD_BITS: u8 = 16;

/// The position of a field inside a 16-bit word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitField {
    /// Offset of the lowest bit of the field
    pub bit: u8,
    /// Number of bits
    pub len: u8,
}

impl BitField {
    /// Create a field of `len` bits starting at `bit`
    pub const fn new(bit: u8, len: u8) -> Self {
        Self { bit, len }
    }

    /// The mask of the field, already shifted into place
    pub const fn mask(&self) -> u16 {
        let unshifted = if self.len >= 16 {
            u16::MAX
        } else {
            (1u16 << self.len) - 1
        };
        unshifted << self.bit
    }

    /// Extract the field from a word
    pub const fn get(&self, word: u16) -> u16 {
        (word & self.mask()) >> self.bit
    }

    /// Return `word` with the field replaced by `value`
    ///
    /// Bits of `value` that do not fit the field are dropped.
    pub const fn set(&self, word: u16, value: u16) -> u16 {
        (word & !self.mask()) | ((value << self.bit) & self.mask())
    }

    /// Extract a single bit field as a bool
    pub const fn is_set(&self, word: u16) -> bool {
        self.get(word) != 0
    }

    /// Lay out consecutive fields of the given widths, starting at bit 0
    ///
    /// Returns None if the widths exceed one word.
    pub fn pack_all(widths: &[u8]) -> Option<Vec<BitField>> {
        let mut bit = 0u8;
        let mut fields = Vec::with_capacity(widths.len());
        for &len in widths {
            if len == 0 || bit as usize + len as usize > PACKED_WORD_BITS as usize {
                return None;
            }
            fields.push(BitField::new(bit, len));
            bit += len;
        }
        Some(fields)
    }
}

/// One mapped unit of a PDO after grouping sub-byte runs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MappingGroup {
    /// A byte aligned object of 8, 16 or 32 bits
    Whole(PdoMapping),
    /// A 16-bit word holding several sub-byte objects
    Packed {
        /// The first object of the run; the word is mapped under its index and sub index
        first: PdoMapping,
        /// Each object of the run with its position in the word
        fields: Vec<(PdoMapping, BitField)>,
    },
}

impl MappingGroup {
    /// The mapping entry used for the variable carrying this group
    pub fn word_mapping(&self) -> PdoMapping {
        match self {
            MappingGroup::Whole(m) => *m,
            MappingGroup::Packed { first, .. } => PdoMapping {
                index: first.index,
                sub: first.sub,
                size: PACKED_WORD_BITS,
            },
        }
    }
}

/// Group a device mapping list into whole objects and packed 16-bit words
///
/// Any object whose width is not a multiple of 8 starts a run that is closed once it adds up to
/// exactly 16 bits. Byte aligned objects inside a run (e.g. an 8-bit gap) join the run.
pub fn group_mappings(mappings: &[PdoMapping]) -> Result<Vec<MappingGroup>, ConfigError> {
    let mut groups = Vec::new();
    let mut run: Vec<(PdoMapping, BitField)> = Vec::new();
    let mut run_bits = 0u8;

    for m in mappings {
        if run.is_empty() && m.size % 8 == 0 {
            groups.push(MappingGroup::Whole(*m));
            continue;
        }
        if m.size == 0 || run_bits as usize + m.size as usize > PACKED_WORD_BITS as usize {
            let (first, _) = run.first().copied().unwrap_or((*m, BitField::new(0, 0)));
            return Err(ConfigError::UnalignedMapping {
                index: first.index,
                sub: first.sub,
            });
        }
        run.push((*m, BitField::new(run_bits, m.size)));
        run_bits += m.size;
        if run_bits == PACKED_WORD_BITS {
            let fields = core::mem::take(&mut run);
            groups.push(MappingGroup::Packed {
                first: fields[0].0,
                fields,
            });
            run_bits = 0;
        }
    }

    if let Some((first, _)) = run.first() {
        return Err(ConfigError::UnalignedMapping {
            index: first.index,
            sub: first.sub,
        });
    }
    Ok(groups)
}
