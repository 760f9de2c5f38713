//! Trait for values that travel through a [`WireBuffer`] without a
//! self-describing format.

use crate::error::WireError;
use crate::types::{EntityId, PlayerId};
use crate::wire::WireBuffer;

/// Bit-level serialization for event payloads and property values.
///
/// Implementations must read exactly what they write. Integers use their
/// natural width; use a compressor inside a custom impl when the range is
/// known to be smaller.
pub trait WireCodec: Sized {
    fn write(&self, buffer: &mut WireBuffer);
    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError>;

    /// Encodes `self` into a fresh byte vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = WireBuffer::new();
        self.write(&mut buffer);
        buffer.into_bytes()
    }

    /// Decodes a value from bytes produced by [`WireCodec::to_bytes`].
    fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read(&mut WireBuffer::from_bytes(bytes.to_vec()))
    }
}

macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl WireCodec for $ty {
            fn write(&self, buffer: &mut WireBuffer) {
                buffer.write_bits(*self as u64, <$ty>::BITS);
            }

            fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
                Ok(buffer.read_bits(<$ty>::BITS)? as $ty)
            }
        }
    )*};
}

macro_rules! impl_signed {
    ($($ty:ty => $uty:ty),*) => {$(
        impl WireCodec for $ty {
            fn write(&self, buffer: &mut WireBuffer) {
                buffer.write_bits(*self as $uty as u64, <$ty>::BITS);
            }

            fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
                Ok(buffer.read_bits(<$ty>::BITS)? as $uty as $ty)
            }
        }
    )*};
}

impl_unsigned!(u8, u16, u32, u64);
impl_signed!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

impl WireCodec for bool {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_bool(*self);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        buffer.read_bool()
    }
}

impl WireCodec for f32 {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_bits(self.to_bits() as u64, 32);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        Ok(f32::from_bits(buffer.read_bits(32)? as u32))
    }
}

impl WireCodec for f64 {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_bits(self.to_bits(), 64);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        Ok(f64::from_bits(buffer.read_bits(64)?))
    }
}

impl WireCodec for String {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_string(self);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        buffer.read_string()
    }
}

impl WireCodec for Vec<u8> {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_binary(self);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        buffer.read_binary()
    }
}

impl WireCodec for PlayerId {
    fn write(&self, buffer: &mut WireBuffer) {
        let (high, low) = self.to_parts();
        buffer.write_bits(high, 64);
        buffer.write_bits(low, 64);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        let high = buffer.read_bits(64)?;
        let low = buffer.read_bits(64)?;
        Ok(PlayerId::from_parts(high, low))
    }
}

impl WireCodec for EntityId {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_bits(self.0 as u64, 32);
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        Ok(EntityId(buffer.read_bits(32)? as u32))
    }
}

impl<T: WireCodec> WireCodec for Option<T> {
    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_bool(self.is_some());
        if let Some(value) = self {
            value.write(buffer);
        }
    }

    fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
        if buffer.read_bool()? {
            Ok(Some(T::read(buffer)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_values_keep_sign() {
        let mut buffer = WireBuffer::new();
        (-5i16).write(&mut buffer);
        i64::MIN.write(&mut buffer);
        assert_eq!(i16::read(&mut buffer).unwrap(), -5);
        assert_eq!(i64::read(&mut buffer).unwrap(), i64::MIN);
    }

    #[test]
    fn test_option_and_ids() {
        let player = PlayerId::new();
        let mut buffer = WireBuffer::new();
        Some(player).write(&mut buffer);
        None::<EntityId>.write(&mut buffer);
        Some(EntityId(9)).write(&mut buffer);

        assert_eq!(Option::<PlayerId>::read(&mut buffer).unwrap(), Some(player));
        assert_eq!(Option::<EntityId>::read(&mut buffer).unwrap(), None);
        assert_eq!(Option::<EntityId>::read(&mut buffer).unwrap(), Some(EntityId(9)));
    }

    #[test]
    fn test_to_bytes_from_bytes() {
        let bytes = String::from("hi").to_bytes();
        assert_eq!(String::from_bytes(&bytes).unwrap(), "hi");
        assert_eq!(1.5f32.to_bytes(), 1.5f32.to_bits().to_be_bytes().to_vec());
    }
}
