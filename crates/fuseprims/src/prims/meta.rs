//! Shape and dtype inference for every primitive, computed on [`TensorMeta`] alone.
//!
//! Reference kernels call these functions to derive their output metadata, so meta and eager
//! results agree by construction. Reduction dims are expected already canonical (sorted, unique,
//! in range); see [`super::utils::reduction_dims`].

use crate::error::{PrimError, PrimResult};
use crate::ops::{BinaryOp, TernaryOp, UnaryOp};
use crate::tensor::{DType, Shape, TensorMeta};

fn unsupported(op: impl std::fmt::Display, dtype: DType) -> PrimError {
    PrimError::dtype_not_supported(op.to_string(), dtype)
}

/// Output dtype of a unary operator, or an error when the input dtype is outside its domain.
pub fn unary_dtype(op: UnaryOp, dtype: DType) -> PrimResult<DType> {
    use UnaryOp::*;
    let ok = match op {
        Abs | Neg => !dtype.is_bool(),
        Real => dtype.is_float() || dtype.is_complex(),
        Imag => dtype.is_complex(),
        Isfinite => true,
        BitwiseNot => dtype.is_integral(),
        Ceil | Floor | Round | Trunc | Sign => dtype.is_real_number(),
        Acos | Asin | Atan | Atanh | Cos | Cosh | Erf | Erfc | Exp | Expm1 | Lgamma | Log
        | Log1p | Log2 | Log10 | Reciprocal | Rsqrt | Sin | Sinh | Sqrt | Tan | Tanh => {
            dtype.is_float()
        }
    };
    if !ok {
        return Err(unsupported(op, dtype));
    }
    Ok(match op {
        Isfinite => DType::Bool,
        Abs | Real | Imag => dtype.corresponding_real(),
        _ => dtype,
    })
}

pub fn elementwise_unary(op: UnaryOp, a: &TensorMeta) -> PrimResult<TensorMeta> {
    let dtype = unary_dtype(op, a.dtype)?;
    Ok(TensorMeta::new(dtype, a.shape.clone()))
}

/// Output dtype of a binary operator applied to two operands of `dtype`.
pub fn binary_dtype(op: BinaryOp, dtype: DType) -> PrimResult<DType> {
    use BinaryOp::*;
    let ok = match op {
        Add | Sub | Mul | Div => !dtype.is_bool(),
        Eq | Ne => true,
        Ge | Gt | Le | Lt => dtype.is_real_number() || dtype.is_bool(),
        Atan2 => dtype.is_float(),
        Fmod | Remainder | Pow => dtype.is_real_number(),
        BitwiseAnd | BitwiseOr | BitwiseXor => dtype.is_integral(),
    };
    if !ok {
        return Err(unsupported(op, dtype));
    }
    Ok(if op.is_comparison() { DType::Bool } else { dtype })
}

fn same_shape(op: &str, lhs: &Shape, rhs: &Shape) -> PrimResult<()> {
    if lhs != rhs {
        return Err(PrimError::shape(
            op,
            format!("operand shapes {lhs} and {rhs} differ; primitives do not broadcast"),
        ));
    }
    Ok(())
}

fn same_dtype(op: &str, lhs: DType, rhs: DType) -> PrimResult<()> {
    if lhs != rhs {
        return Err(PrimError::DTypeMismatch {
            op: op.to_string(),
            lhs,
            rhs,
        });
    }
    Ok(())
}

pub fn elementwise_binary(op: BinaryOp, a: &TensorMeta, b: &TensorMeta) -> PrimResult<TensorMeta> {
    same_shape(op.name(), &a.shape, &b.shape)?;
    same_dtype(op.name(), a.dtype, b.dtype)?;
    let dtype = binary_dtype(op, a.dtype)?;
    Ok(TensorMeta::new(dtype, a.shape.clone()))
}

pub fn where_(pred: &TensorMeta, a: &TensorMeta, b: &TensorMeta) -> PrimResult<TensorMeta> {
    let op = TernaryOp::Where.name();
    if !pred.dtype.is_bool() {
        return Err(PrimError::shape(
            op,
            format!("predicate must be a bool tensor, got {pred}"),
        ));
    }
    same_shape(op, &pred.shape, &a.shape)?;
    same_shape(op, &a.shape, &b.shape)?;
    same_dtype(op, a.dtype, b.dtype)?;
    Ok(a.clone())
}

/// Validates a `broadcast_in_dim` request; `broadcast_dimensions[i]` is the output axis that
/// input axis `i` maps to.
pub fn broadcast_in_dim(
    a: &TensorMeta,
    shape: &[usize],
    broadcast_dimensions: &[usize],
) -> PrimResult<TensorMeta> {
    let op = "broadcast_in_dim";
    if broadcast_dimensions.len() != a.rank() {
        return Err(PrimError::shape(
            op,
            format!(
                "broadcast_dimensions {:?} must name one output axis per input axis of {}",
                broadcast_dimensions, a
            ),
        ));
    }
    if broadcast_dimensions.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(PrimError::shape(
            op,
            format!("broadcast_dimensions {broadcast_dimensions:?} must be strictly increasing"),
        ));
    }
    for (axis, (&input_dim, &target_axis)) in a.dims().iter().zip(broadcast_dimensions).enumerate()
    {
        let Some(&target_dim) = shape.get(target_axis) else {
            return Err(PrimError::shape(
                op,
                format!(
                    "broadcast dimension {target_axis} is out of range for output rank {}",
                    shape.len()
                ),
            ));
        };
        if input_dim != 1 && input_dim != target_dim {
            return Err(PrimError::shape(
                op,
                format!(
                    "input axis {axis} has size {input_dim}, which cannot broadcast to {target_dim}"
                ),
            ));
        }
    }
    Ok(TensorMeta::new(a.dtype, shape.to_vec()))
}

pub fn convert_element_type(a: &TensorMeta, dtype: DType) -> TensorMeta {
    TensorMeta::new(dtype, a.shape.clone())
}

fn check_reduction_dims(op: &str, a: &TensorMeta, dims: &[usize]) -> PrimResult<()> {
    if dims.windows(2).any(|pair| pair[0] >= pair[1]) || dims.iter().any(|&d| d >= a.rank()) {
        return Err(PrimError::shape(
            op,
            format!("reduction dims {dims:?} are not canonical for {a}"),
        ));
    }
    Ok(())
}

/// Common reduction metadata: reduced axes are removed and the dtype replaced.
pub fn reduction(
    op: &str,
    a: &TensorMeta,
    dims: &[usize],
    output_dtype: DType,
) -> PrimResult<TensorMeta> {
    check_reduction_dims(op, a, dims)?;
    Ok(TensorMeta::new(output_dtype, a.shape.without_axes(dims)))
}

pub fn sum(a: &TensorMeta, dims: &[usize]) -> PrimResult<TensorMeta> {
    if a.dtype.is_bool() {
        return Err(unsupported("sum", a.dtype));
    }
    reduction("sum", a, dims, a.dtype)
}

fn check_correction(op: &str, correction: i64) -> PrimResult<()> {
    if correction < 0 {
        return Err(PrimError::invalid_argument(
            op,
            format!("correction must be non-negative, got {correction}"),
        ));
    }
    Ok(())
}

/// Variance keeps floating inputs' dtype and maps complex inputs onto their real dtype.
pub fn var(a: &TensorMeta, dims: &[usize], correction: i64) -> PrimResult<TensorMeta> {
    if !(a.dtype.is_float() || a.dtype.is_complex()) {
        return Err(unsupported("var", a.dtype));
    }
    check_correction("var", correction)?;
    reduction("var", a, dims, a.dtype.corresponding_real())
}

/// `(variance, mean)` metadata; the mean keeps the input dtype.
pub fn var_mean(
    a: &TensorMeta,
    dims: &[usize],
    correction: i64,
) -> PrimResult<(TensorMeta, TensorMeta)> {
    if !(a.dtype.is_float() || a.dtype.is_complex()) {
        return Err(unsupported("var_mean", a.dtype));
    }
    check_correction("var_mean", correction)?;
    let var = reduction("var_mean", a, dims, a.dtype.corresponding_real())?;
    let mean = reduction("var_mean", a, dims, a.dtype)?;
    Ok((var, mean))
}

fn extremum(op: &str, a: &TensorMeta, dims: &[usize]) -> PrimResult<TensorMeta> {
    if !(a.dtype.is_real_number() || a.dtype.is_bool()) {
        return Err(unsupported(op, a.dtype));
    }
    if dims.iter().any(|&d| a.dims().get(d) == Some(&0)) {
        return Err(PrimError::shape(
            op,
            format!("cannot reduce zero-sized dimension of {a}; the identity is undefined"),
        ));
    }
    reduction(op, a, dims, a.dtype)
}

pub fn amax(a: &TensorMeta, dims: &[usize]) -> PrimResult<TensorMeta> {
    extremum("amax", a, dims)
}

pub fn amin(a: &TensorMeta, dims: &[usize]) -> PrimResult<TensorMeta> {
    extremum("amin", a, dims)
}
