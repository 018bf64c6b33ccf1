//! Literal values attached to fields and parameters.

use std::fmt;

use crate::metadata::signatures::TypeSig;

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `bool`
    Boolean(bool),
    /// `char`
    Char(u16),
    /// `int8`
    I1(i8),
    /// `uint8`
    U1(u8),
    /// `int16`
    I2(i16),
    /// `uint16`
    U2(u16),
    /// `int32`
    I4(i32),
    /// `uint32`
    U4(u32),
    /// `int64`
    I8(i64),
    /// `uint64`
    U8(u64),
    /// `float32`
    R4(f32),
    /// `float64`
    R8(f64),
    /// `string`
    String(String),
    /// Null reference
    Null,
}

impl Constant {
    /// The value widened to `i64` for integer constants.
    ///
    /// `uint64` values above `i64::MAX` yield `None`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::Boolean(v) => Some(i64::from(*v)),
            Constant::Char(v) => Some(i64::from(*v)),
            Constant::I1(v) => Some(i64::from(*v)),
            Constant::U1(v) => Some(i64::from(*v)),
            Constant::I2(v) => Some(i64::from(*v)),
            Constant::U2(v) => Some(i64::from(*v)),
            Constant::I4(v) => Some(i64::from(*v)),
            Constant::U4(v) => Some(i64::from(*v)),
            Constant::I8(v) => Some(*v),
            Constant::U8(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// An integer constant of the width given by `underlying`.
    ///
    /// Returns `None` if `underlying` is not an integer type or `value` does not fit.
    #[must_use]
    pub fn integer(underlying: &TypeSig, value: i64) -> Option<Constant> {
        Some(match underlying {
            TypeSig::Boolean => match value {
                0 => Constant::Boolean(false),
                1 => Constant::Boolean(true),
                _ => return None,
            },
            TypeSig::Char => Constant::Char(u16::try_from(value).ok()?),
            TypeSig::I1 => Constant::I1(i8::try_from(value).ok()?),
            TypeSig::U1 => Constant::U1(u8::try_from(value).ok()?),
            TypeSig::I2 => Constant::I2(i16::try_from(value).ok()?),
            TypeSig::U2 => Constant::U2(u16::try_from(value).ok()?),
            TypeSig::I4 => Constant::I4(i32::try_from(value).ok()?),
            TypeSig::U4 => Constant::U4(u32::try_from(value).ok()?),
            TypeSig::I8 => Constant::I8(value),
            TypeSig::U8 => Constant::U8(u64::try_from(value).ok()?),
            _ => return None,
        })
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Boolean(v) => write!(f, "bool({v})"),
            Constant::Char(v) => write!(f, "char(0x{v:04X})"),
            Constant::I1(v) => write!(f, "int8({v})"),
            Constant::U1(v) => write!(f, "uint8({v})"),
            Constant::I2(v) => write!(f, "int16({v})"),
            Constant::U2(v) => write!(f, "uint16({v})"),
            Constant::I4(v) => write!(f, "int32({v})"),
            Constant::U4(v) => write!(f, "uint32({v})"),
            Constant::I8(v) => write!(f, "int64({v})"),
            Constant::U8(v) => write!(f, "uint64({v})"),
            Constant::R4(v) => write!(f, "float32({v})"),
            Constant::R8(v) => write!(f, "float64({v})"),
            Constant::String(v) => write!(f, "{v:?}"),
            Constant::Null => write!(f, "nullref"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_underlying_type() {
        assert_eq!(Constant::integer(&TypeSig::I4, 3), Some(Constant::I4(3)));
        assert_eq!(Constant::integer(&TypeSig::U1, 255), Some(Constant::U1(255)));
        assert_eq!(Constant::integer(&TypeSig::U1, 256), None);
        assert_eq!(Constant::integer(&TypeSig::U4, -1), None);
        assert_eq!(Constant::integer(&TypeSig::String, 1), None);
    }

    #[test]
    fn widening() {
        assert_eq!(Constant::I2(-7).as_i64(), Some(-7));
        assert_eq!(Constant::U8(u64::MAX).as_i64(), None);
        assert_eq!(Constant::String("x".into()).as_i64(), None);
    }
}
