//! Little-endian primitive encoding shared by the image reader and writer.
//!
//! [`CilIO`] abstracts over the fixed-width primitives that appear in a module image, so the
//! reading side ([`read_le_at`], [`crate::file::parser::Parser`]) and the writing side
//! ([`write_le`], [`write_compressed_uint`]) can be generic over the value type.
//!
//! Variable-length integers use the ECMA-335 compressed encoding: one byte for values below
//! `0x80`, two bytes below `0x4000` and four bytes up to `0x1FFF_FFFF`.

use crate::Result;

/// Maximum value representable by the compressed unsigned integer encoding.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Fixed-width primitive with a little-endian byte representation.
pub trait CilIO: Sized {
    /// Byte array type matching the width of `Self`
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode into little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Reads a `T` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset
        .checked_add(type_len)
        .ok_or_else(|| out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Appends the little-endian representation of `value` to `buffer`.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Appends `value` using the compressed unsigned integer encoding.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
pub fn write_compressed_uint(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..=0x7F => buffer.push(value as u8),
        0x80..=0x3FFF => {
            buffer.push(0x80 | (value >> 8) as u8);
            buffer.push(value as u8);
        }
        0x4000..=MAX_COMPRESSED_UINT => {
            buffer.push(0xC0 | (value >> 24) as u8);
            buffer.push((value >> 16) as u8);
            buffer.push((value >> 8) as u8);
            buffer.push(value as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value {:#x} is too large for a compressed integer",
                value
            ))
        }
    }
    Ok(())
}

/// Appends `value` using the signed compressed encoding, sign in the lowest bit.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the magnitude does not fit the compressed encoding.
pub fn write_compressed_int(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    let encoded = if value >= 0 {
        (value as u32) << 1
    } else {
        ((-(i64::from(value) + 1)) as u32) << 1 | 1
    };
    write_compressed_uint(buffer, encoded)
}

/// Appends a compressed length followed by the raw bytes.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the length does not fit the compressed encoding.
pub fn write_prefixed_bytes(buffer: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| malformed_error!("Blob of {} bytes is too large", bytes.len()))?;
    write_compressed_uint(buffer, len)?;
    buffer.extend_from_slice(bytes);
    Ok(())
}
