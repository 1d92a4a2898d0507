//! Dimension, correction and type-promotion helpers shared by realizations and lowerings.

use crate::error::{PrimError, PrimResult};
use crate::tensor::{DType, Shape};

/// Wraps a possibly negative dimension index into `0..rank`.
///
/// Scalars wrap as if they had rank 1, so `0` and `-1` both name their only (virtual) dimension.
pub fn canonicalize_dim(rank: usize, dim: i64) -> PrimResult<usize> {
    let bound = rank.max(1) as i64;
    let wrapped = if dim < 0 { dim + bound } else { dim };
    if wrapped < 0 || wrapped >= bound {
        return Err(PrimError::invalid_argument(
            "canonicalize_dim",
            format!(
                "dimension {dim} is out of range for a tensor of rank {rank} (expected [{}, {}])",
                -bound,
                bound - 1
            ),
        ));
    }
    Ok(wrapped as usize)
}

/// Resolves a reduction dimension list against `shape`.
///
/// `None` and an empty list both mean every dimension. The result is sorted; repeated dimensions
/// (after wrapping) are rejected. A scalar has no real axes, so its dims resolve to an empty list.
pub fn reduction_dims(shape: &Shape, dims: Option<&[i64]>) -> PrimResult<Vec<usize>> {
    let rank = shape.rank();
    let dims = match dims {
        None | Some([]) => return Ok((0..rank).collect()),
        Some(dims) => dims,
    };
    let mut resolved = dims
        .iter()
        .map(|&dim| canonicalize_dim(rank, dim))
        .collect::<PrimResult<Vec<_>>>()?;
    resolved.sort_unstable();
    if resolved.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(PrimError::invalid_argument(
            "reduction_dims",
            format!("duplicate value in dims {dims:?}"),
        ));
    }
    if rank == 0 {
        resolved.clear();
    }
    Ok(resolved)
}

/// Normalises the legacy `unbiased` flag and the `correction` term into one correction value.
///
/// Supplying both is a caller error; supplying neither selects the sample variance (1).
pub fn set_correction(unbiased: Option<bool>, correction: Option<i64>) -> PrimResult<i64> {
    match (unbiased, correction) {
        (Some(_), Some(_)) => Err(PrimError::invalid_argument(
            "set_correction",
            "cannot specify both unbiased and correction",
        )),
        (None, None) => Ok(1),
        (Some(unbiased), None) => Ok(i64::from(unbiased)),
        (None, Some(correction)) if correction < 0 => Err(PrimError::invalid_argument(
            "set_correction",
            format!("correction must be non-negative, got {correction}"),
        )),
        (None, Some(correction)) => Ok(correction),
    }
}

/// How elementwise wrappers derive computation and result dtypes from their inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePromotionKind {
    /// Result keeps the promoted input dtype.
    Default,
    /// Integral inputs compute in the default float; complex results map to their real dtype.
    ComplexToFloat,
    /// Integral inputs compute and return in the default float.
    IntToFloat,
    /// Result is always `bool`.
    AlwaysBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Category {
    Bool,
    Integer,
    Float,
    Complex,
}

fn category(dtype: DType) -> Category {
    if dtype.is_bool() {
        Category::Bool
    } else if dtype.is_integer() {
        Category::Integer
    } else if dtype.is_float() {
        Category::Float
    } else {
        Category::Complex
    }
}

/// Smallest dtype able to represent values of both `lhs` and `rhs`.
pub fn promote_types(lhs: DType, rhs: DType) -> DType {
    use DType::*;
    if lhs == rhs {
        return lhs;
    }
    let (lc, rc) = (category(lhs), category(rhs));
    if lc != rc {
        let (high, low) = if lc > rc { (lhs, rhs) } else { (rhs, lhs) };
        return match (high, low) {
            (C64, F64) => C128,
            _ => high,
        };
    }
    match (lhs, rhs) {
        (C128, _) | (_, C128) => C128,
        (F64, _) | (_, F64) => F64,
        (F32, _) | (_, F32) => F32,
        (F16, BF16) | (BF16, F16) => F32,
        (I64, _) | (_, I64) => I64,
        (I32, _) | (_, I32) => I32,
        (I16, _) | (_, I16) => I16,
        (U8, I8) | (I8, U8) => I16,
        _ => lhs,
    }
}

/// Returns `(computation_dtype, result_dtype)` for an elementwise operation over `dtypes`.
pub fn elementwise_dtypes(
    dtypes: &[DType],
    kind: TypePromotionKind,
) -> PrimResult<(DType, DType)> {
    let (&first, rest) = dtypes.split_first().ok_or_else(|| {
        PrimError::invalid_argument("elementwise_dtypes", "at least one dtype is required")
    })?;
    let promoted = rest.iter().fold(first, |acc, &dtype| promote_types(acc, dtype));
    let computation = match promoted {
        DType::F16 | DType::BF16 => DType::F32,
        dtype => dtype,
    };
    let floating_if_integral = |dtype: DType| {
        if dtype.is_integral() {
            DType::DEFAULT_FLOAT
        } else {
            dtype
        }
    };
    Ok(match kind {
        TypePromotionKind::Default => (computation, promoted),
        TypePromotionKind::ComplexToFloat => (
            floating_if_integral(computation),
            floating_if_integral(promoted).corresponding_real(),
        ),
        TypePromotionKind::IntToFloat => (
            floating_if_integral(computation),
            floating_if_integral(promoted),
        ),
        TypePromotionKind::AlwaysBool => (computation, DType::Bool),
    })
}
