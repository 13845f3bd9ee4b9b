//! Conversions between typed process values and their raw wire bits

mod sealed {
    pub trait Sealed {}
}

/// An integer type which can be mapped into a PDO
///
/// Implemented for the 8, 16 and 32 bit signed and unsigned integers.
pub trait PdoValue: Copy + Send + Sync + 'static + sealed::Sealed {
    /// Width of the value on the wire
    const BITS: u8;
    /// True for two's complement types
    const SIGNED: bool;

    /// Convert to the raw bits, zero extended to 32 bits
    fn to_bits(self) -> u32;

    /// Convert from raw bits, using only the lowest `BITS` bits
    fn from_bits(bits: u32) -> Self;
}

macro_rules! impl_pdo_value {
    ($t:ty, $ut:ty, $signed:expr) => {
        impl sealed::Sealed for $t {}

        impl PdoValue for $t {
            const BITS: u8 = <$t>::BITS as u8;
            const SIGNED: bool = $signed;

            fn to_bits(self) -> u32 {
                self as $ut as u32
            }

            fn from_bits(bits: u32) -> Self {
                bits as $ut as $t
            }
        }
    };
}

impl_pdo_value!(u8, u8, false);
impl_pdo_value!(i8, u8, true);
impl_pdo_value!(u16, u16, false);
impl_pdo_value!(i16, u16, true);
impl_pdo_value!(u32, u32, false);
impl_pdo_value!(i32, u32, true);

/// Mask selecting the lowest `bits` bits of a word
pub(crate) const fn width_mask(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Sign extend the lowest `bits` bits of `raw`
pub(crate) const fn sign_extend(raw: u32, bits: u8) -> i64 {
    let shift = 64 - bits as u32;
    ((raw as i64) << shift) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_bits() {
        assert_eq!(0xFF, (-1i8).to_bits());
        assert_eq!(0xFFFF, (-1i16).to_bits());
        assert_eq!(-2i16, i16::from_bits(0xFFFE));
        assert_eq!(i32::MIN, i32::from_bits(0x8000_0000));
        assert_eq!(-1, sign_extend(0xFFFF, 16));
        assert_eq!(0x7FFF, sign_extend(0x7FFF, 16));
        assert_eq!(0xFF, width_mask(8));
    }
}
