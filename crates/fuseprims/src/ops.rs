//! Elementwise operator families shared by the primitive set, the fusion IR and the catalog.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_op_family {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every operator of the family, in catalog order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical operation name, identical across every realization.
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_op_family!(
    /// One tensor in, one tensor out.
    UnaryOp {
        Abs => "abs",
        Acos => "acos",
        Asin => "asin",
        Atan => "atan",
        Atanh => "atanh",
        Cos => "cos",
        Cosh => "cosh",
        BitwiseNot => "bitwise_not",
        Ceil => "ceil",
        Erf => "erf",
        Erfc => "erfc",
        Exp => "exp",
        Expm1 => "expm1",
        Floor => "floor",
        Imag => "imag",
        Isfinite => "isfinite",
        Lgamma => "lgamma",
        Log => "log",
        Log1p => "log1p",
        Log2 => "log2",
        Log10 => "log10",
        Real => "real",
        Reciprocal => "reciprocal",
        Neg => "neg",
        Round => "round",
        Rsqrt => "rsqrt",
        Sign => "sign",
        Sin => "sin",
        Sinh => "sinh",
        Sqrt => "sqrt",
        Tan => "tan",
        Tanh => "tanh",
        Trunc => "trunc",
    }
);

define_op_family!(
    /// Two same-shaped tensors in, one tensor out.
    BinaryOp {
        Add => "add",
        Atan2 => "atan2",
        BitwiseAnd => "bitwise_and",
        BitwiseOr => "bitwise_or",
        BitwiseXor => "bitwise_xor",
        Div => "div",
        Eq => "eq",
        Fmod => "fmod",
        Ge => "ge",
        Gt => "gt",
        Le => "le",
        Lt => "lt",
        Mul => "mul",
        Ne => "ne",
        Pow => "pow",
        Remainder => "remainder",
        Sub => "sub",
    }
);

define_op_family!(
    /// Three operands: a boolean predicate selecting between two tensors.
    TernaryOp {
        Where => "where",
    }
);

impl BinaryOp {
    /// Comparison operators produce a `bool` tensor.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Ge | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Lt
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr | BinaryOp::BitwiseXor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_sizes_match_catalog_partitions() {
        assert_eq!(UnaryOp::ALL.len(), 33);
        assert_eq!(BinaryOp::ALL.len(), 17);
        assert_eq!(TernaryOp::ALL.len(), 1);
    }

    #[test]
    fn names_round_trip() {
        for op in UnaryOp::ALL {
            assert_eq!(UnaryOp::from_name(op.name()), Some(*op));
        }
        for op in BinaryOp::ALL {
            assert_eq!(BinaryOp::from_name(op.name()), Some(*op));
        }
        assert_eq!(UnaryOp::from_name("where"), None);
    }
}
