//! Primitive catalog: byte width, signedness, numeric range and C name of each scalar kind.

use std::fmt;

/// Scalar kinds a field can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl BaseType {
    pub const ALL: [BaseType; 10] = [
        BaseType::U8,
        BaseType::U16,
        BaseType::U32,
        BaseType::U64,
        BaseType::I8,
        BaseType::I16,
        BaseType::I32,
        BaseType::I64,
        BaseType::F32,
        BaseType::F64,
    ];

    pub fn byte_width(self) -> usize {
        match self {
            BaseType::U8 | BaseType::I8 => 1,
            BaseType::U16 | BaseType::I16 => 2,
            BaseType::U32 | BaseType::I32 | BaseType::F32 => 4,
            BaseType::U64 | BaseType::I64 | BaseType::F64 => 8,
        }
    }

    /// Natural alignment equals the byte width for every primitive.
    pub fn alignment(self) -> usize {
        self.byte_width()
    }

    pub fn bit_capacity(self) -> u32 {
        (self.byte_width() * 8) as u32
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BaseType::I8 | BaseType::I16 | BaseType::I32 | BaseType::I64 | BaseType::F32 | BaseType::F64
        )
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, BaseType::F32 | BaseType::F64)
    }

    /// Inclusive integer domain. `None` for floating-point kinds.
    pub fn int_range(self) -> Option<(i128, i128)> {
        Some(match self {
            BaseType::U8 => (0, u8::MAX as i128),
            BaseType::U16 => (0, u16::MAX as i128),
            BaseType::U32 => (0, u32::MAX as i128),
            BaseType::U64 => (0, u64::MAX as i128),
            BaseType::I8 => (i8::MIN as i128, i8::MAX as i128),
            BaseType::I16 => (i16::MIN as i128, i16::MAX as i128),
            BaseType::I32 => (i32::MIN as i128, i32::MAX as i128),
            BaseType::I64 => (i64::MIN as i128, i64::MAX as i128),
            BaseType::F32 | BaseType::F64 => return None,
        })
    }

    /// Canonical ANSI C spelling used by the declaration generator.
    pub fn c_name(self) -> &'static str {
        match self {
            BaseType::U8 => "unsigned char",
            BaseType::U16 => "unsigned short",
            BaseType::U32 => "unsigned int",
            BaseType::U64 => "unsigned long",
            BaseType::I8 => "signed char",
            BaseType::I16 => "signed short",
            BaseType::I32 => "signed int",
            BaseType::I64 => "signed long",
            BaseType::F32 => "float",
            BaseType::F64 => "double",
        }
    }

    /// Schema-language spelling (`u8`, `i32`, `f64`, ...).
    pub fn short_name(self) -> &'static str {
        match self {
            BaseType::U8 => "u8",
            BaseType::U16 => "u16",
            BaseType::U32 => "u32",
            BaseType::U64 => "u64",
            BaseType::I8 => "i8",
            BaseType::I16 => "i16",
            BaseType::I32 => "i32",
            BaseType::I64 => "i64",
            BaseType::F32 => "f32",
            BaseType::F64 => "f64",
        }
    }

    pub fn from_short_name(s: &str) -> Option<BaseType> {
        BaseType::ALL.iter().copied().find(|b| b.short_name() == s)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
