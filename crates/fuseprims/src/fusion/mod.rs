//! Fused-kernel intermediate representation consumed by lowerings.
//!
//! [`FusionBuilder`] is the explicit operator interface every lowering writes against: one method
//! per backend operator family. [`FusionDefinition`] records the calls as an SSA program that a
//! [`FusionBackend`](backend::FusionBackend) can execute.

pub mod backend;
mod definition;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PrimError, PrimResult};
pub use crate::ops::{BinaryOp, TernaryOp, UnaryOp};
use crate::tensor::{DType, TensorMeta};

pub use definition::{FusionDefinition, FusionOp, Instruction};

/// Backend-internal element type tag.
///
/// `Null` means "no override" where a tag is optional (e.g. the output dtype of `sum`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FusionDType {
    Bool,
    Int32,
    Int,
    Half,
    BFloat16,
    Float,
    Double,
    ComplexFloat,
    ComplexDouble,
    Null,
}

impl FusionDType {
    /// Resolves a tensor dtype into its backend tag; 8- and 16-bit integers have none.
    pub fn from_dtype(dtype: DType) -> PrimResult<Self> {
        Ok(match dtype {
            DType::Bool => FusionDType::Bool,
            DType::I32 => FusionDType::Int32,
            DType::I64 => FusionDType::Int,
            DType::F16 => FusionDType::Half,
            DType::BF16 => FusionDType::BFloat16,
            DType::F32 => FusionDType::Float,
            DType::F64 => FusionDType::Double,
            DType::C64 => FusionDType::ComplexFloat,
            DType::C128 => FusionDType::ComplexDouble,
            DType::U8 | DType::I8 | DType::I16 => {
                return Err(PrimError::dtype_not_supported("fusion", dtype))
            }
        })
    }

    /// Inverse of [`FusionDType::from_dtype`]; `Null` has no tensor dtype.
    pub fn to_dtype(self) -> Option<DType> {
        Some(match self {
            FusionDType::Bool => DType::Bool,
            FusionDType::Int32 => DType::I32,
            FusionDType::Int => DType::I64,
            FusionDType::Half => DType::F16,
            FusionDType::BFloat16 => DType::BF16,
            FusionDType::Float => DType::F32,
            FusionDType::Double => DType::F64,
            FusionDType::ComplexFloat => DType::C64,
            FusionDType::ComplexDouble => DType::C128,
            FusionDType::Null => return None,
        })
    }
}

impl fmt::Display for FusionDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType.{self:?}")
    }
}

/// SSA value identifier within one [`FusionDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Symbolic result node: a value id plus the metadata inferred for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FusionTensor {
    pub id: ValueId,
    pub meta: TensorMeta,
}

impl FusionTensor {
    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn rank(&self) -> usize {
        self.meta.rank()
    }
}

// Backend operator names for the non-elementwise families.
pub const WHERE_OPERATOR: &str = "where";
pub const BROADCAST_IN_DIM_OPERATOR: &str = "broadcast_in_dim";
pub const CAST_OPERATOR: &str = "cast";
pub const SUM_OPERATOR: &str = "sum";
pub const VAR_OPERATOR: &str = "var";
pub const VAR_MEAN_OPERATOR: &str = "var_mean";
pub const MAX_OPERATOR: &str = "max";
pub const MIN_OPERATOR: &str = "min";

/// Every operator name a complete fused-kernel backend exposes.
pub fn operator_names() -> Vec<&'static str> {
    UnaryOp::ALL
        .iter()
        .map(|op| op.name())
        .chain(BinaryOp::ALL.iter().map(|op| op.name()))
        .chain([
            WHERE_OPERATOR,
            BROADCAST_IN_DIM_OPERATOR,
            CAST_OPERATOR,
            SUM_OPERATOR,
            VAR_OPERATOR,
            VAR_MEAN_OPERATOR,
            MAX_OPERATOR,
            MIN_OPERATOR,
        ])
        .collect()
}

/// Graph-construction interface of a fused-kernel backend.
///
/// Reduction methods take canonical dims (sorted, unique, in range).
pub trait FusionBuilder {
    /// Declares a graph input.
    fn define_tensor(&mut self, meta: TensorMeta) -> FusionTensor;

    fn unary(&mut self, op: UnaryOp, a: &FusionTensor) -> PrimResult<FusionTensor>;

    fn binary(&mut self, op: BinaryOp, a: &FusionTensor, b: &FusionTensor)
        -> PrimResult<FusionTensor>;

    fn where_(
        &mut self,
        pred: &FusionTensor,
        a: &FusionTensor,
        b: &FusionTensor,
    ) -> PrimResult<FusionTensor>;

    fn broadcast_in_dim(
        &mut self,
        a: &FusionTensor,
        shape: &[usize],
        broadcast_dimensions: &[usize],
    ) -> PrimResult<FusionTensor>;

    fn cast(&mut self, a: &FusionTensor, dtype: FusionDType) -> PrimResult<FusionTensor>;

    fn sum(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        keep_dims: bool,
        output_dtype: FusionDType,
    ) -> PrimResult<FusionTensor>;

    fn var(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        correction: i64,
        keep_dims: bool,
    ) -> PrimResult<FusionTensor>;

    /// Variance and mean from one traversal of `a`.
    fn var_mean(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        correction: i64,
        keep_dims: bool,
    ) -> PrimResult<(FusionTensor, FusionTensor)>;

    fn max(&mut self, a: &FusionTensor, dims: &[usize], keep_dims: bool)
        -> PrimResult<FusionTensor>;

    fn min(&mut self, a: &FusionTensor, dims: &[usize], keep_dims: bool)
        -> PrimResult<FusionTensor>;
}
