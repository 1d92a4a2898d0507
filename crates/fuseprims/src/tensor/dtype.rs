//! Enumerates the scalar element types understood by the primitive registry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between host tensors, meta tensors and lowerings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    U8,
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
    /// Complex value with two `f32` components.
    C64,
    /// Complex value with two `f64` components.
    C128,
}

impl DType {
    /// Default floating dtype used when integer inputs are promoted.
    pub const DEFAULT_FLOAT: DType = DType::F32;

    pub fn is_bool(self) -> bool {
        matches!(self, DType::Bool)
    }

    /// Returns `true` for signed and unsigned integers (bool excluded).
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::U8 | DType::I8 | DType::I16 | DType::I32 | DType::I64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::C64 | DType::C128)
    }

    /// Integers and bools: values for which bitwise operators are defined.
    pub fn is_integral(self) -> bool {
        self.is_bool() || self.is_integer()
    }

    /// Real-valued numbers that support ordering comparisons.
    pub fn is_real_number(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Maps complex dtypes onto the dtype of their components; real dtypes map to themselves.
    pub fn corresponding_real(self) -> DType {
        match self {
            DType::C64 => DType::F32,
            DType::C128 => DType::F64,
            other => other,
        }
    }

    /// Name used in schemas and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::C64 => "complex64",
            DType::C128 => "complex128",
        }
    }

    /// Rounds an `f64` value to what this dtype can represent.
    ///
    /// Integer conversions saturate at the type bounds and truncate toward zero.
    pub fn round_value(self, value: f64) -> f64 {
        match self {
            DType::Bool => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            DType::U8 => (value as u8) as f64,
            DType::I8 => (value as i8) as f64,
            DType::I16 => (value as i16) as f64,
            DType::I32 => (value as i32) as f64,
            DType::I64 => (value as i64) as f64,
            DType::F16 => half::f16::from_f64(value).to_f64(),
            DType::BF16 => half::bf16::from_f64(value).to_f64(),
            DType::F32 | DType::C64 => (value as f32) as f64,
            DType::F64 | DType::C128 => value,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
