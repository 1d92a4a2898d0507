//! Eager host kernels for the primitive set.
//!
//! Every kernel derives its output metadata through [`super::meta`] before touching data. Values
//! are computed in `f64` and rounded to the output dtype when the result tensor is built.

use crate::error::{PrimError, PrimResult};
use crate::ops::{BinaryOp, UnaryOp};
use crate::tensor::{DType, Shape, Tensor, TensorMeta};

use super::meta;

fn materialize(meta: TensorMeta, values: Vec<f64>) -> Tensor {
    let dtype = meta.dtype;
    let values = values
        .into_iter()
        .map(|value| dtype.round_value(value))
        .collect();
    Tensor::from_parts(meta, values)
}

fn unravel_index(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        coords[i] = index % *dim;
        index /= *dim;
    }
    coords
}

fn sign(value: f64) -> f64 {
    if value == 0.0 || value.is_nan() {
        value
    } else {
        value.signum()
    }
}

fn bitwise_not(dtype: DType, value: f64) -> f64 {
    match dtype {
        DType::Bool => f64::from(value == 0.0),
        DType::U8 => f64::from(!(value as u8)),
        _ => !(value as i64) as f64,
    }
}

fn real_unary(op: UnaryOp, dtype: DType, x: f64) -> f64 {
    use UnaryOp::*;
    match op {
        Abs => x.abs(),
        Acos => x.acos(),
        Asin => x.asin(),
        Atan => x.atan(),
        Atanh => x.atanh(),
        Cos => x.cos(),
        Cosh => x.cosh(),
        BitwiseNot => bitwise_not(dtype, x),
        Ceil => x.ceil(),
        Erf => libm::erf(x),
        Erfc => libm::erfc(x),
        Exp => x.exp(),
        Expm1 => libm::expm1(x),
        Floor => x.floor(),
        Imag => 0.0,
        Isfinite => f64::from(x.is_finite()),
        Lgamma => libm::lgamma(x),
        Log => x.ln(),
        Log1p => libm::log1p(x),
        Log2 => x.log2(),
        Log10 => x.log10(),
        Real => x,
        Reciprocal => x.recip(),
        Neg => -x,
        Round => x.round_ties_even(),
        Rsqrt => x.sqrt().recip(),
        Sign => sign(x),
        Sin => x.sin(),
        Sinh => x.sinh(),
        Sqrt => x.sqrt(),
        Tan => x.tan(),
        Tanh => x.tanh(),
        Trunc => x.trunc(),
    }
}

/// Complex inputs reach only the operators whose domain admits them (see [`meta::unary_dtype`]).
fn complex_unary(op: UnaryOp, re: f64, im: f64) -> Vec<f64> {
    match op {
        UnaryOp::Abs => vec![re.hypot(im)],
        UnaryOp::Neg => vec![-re, -im],
        UnaryOp::Real => vec![re],
        UnaryOp::Imag => vec![im],
        UnaryOp::Isfinite => vec![f64::from(re.is_finite() && im.is_finite())],
        _ => vec![f64::NAN, f64::NAN],
    }
}

pub fn elementwise_unary(op: UnaryOp, a: &Tensor) -> PrimResult<Tensor> {
    let out = meta::elementwise_unary(op, a.tensor_meta())?;
    let values = if a.dtype().is_complex() {
        a.complex_values(op.name())?
            .into_iter()
            .flat_map(|(re, im)| complex_unary(op, re, im))
            .collect()
    } else {
        a.values(op.name())?
            .iter()
            .map(|&x| real_unary(op, a.dtype(), x))
            .collect()
    };
    Ok(materialize(out, values))
}

fn zero_divisor(op: BinaryOp) -> PrimError {
    PrimError::invalid_argument(op.name(), "integer division by zero")
}

fn integer_binary(op: BinaryOp, x: f64, y: f64) -> PrimResult<f64> {
    let (xi, yi) = (x as i64, y as i64);
    Ok(match op {
        BinaryOp::Div => {
            if yi == 0 {
                return Err(zero_divisor(op));
            }
            xi.wrapping_div(yi) as f64
        }
        BinaryOp::Fmod => {
            if yi == 0 {
                return Err(zero_divisor(op));
            }
            xi.wrapping_rem(yi) as f64
        }
        BinaryOp::Remainder => {
            if yi == 0 {
                return Err(zero_divisor(op));
            }
            let r = xi.wrapping_rem(yi);
            (if r != 0 && (r < 0) != (yi < 0) { r + yi } else { r }) as f64
        }
        BinaryOp::Pow => {
            if yi < 0 {
                return Err(PrimError::invalid_argument(
                    op.name(),
                    "integers to negative integer powers are not allowed",
                ));
            }
            x.powi(yi.min(i64::from(i32::MAX)) as i32)
        }
        BinaryOp::BitwiseAnd => (xi & yi) as f64,
        BinaryOp::BitwiseOr => (xi | yi) as f64,
        BinaryOp::BitwiseXor => (xi ^ yi) as f64,
        _ => real_binary(op, x, y),
    })
}

fn real_binary(op: BinaryOp, x: f64, y: f64) -> f64 {
    use BinaryOp::*;
    match op {
        Add => x + y,
        Atan2 => x.atan2(y),
        BitwiseAnd => f64::from(x != 0.0 && y != 0.0),
        BitwiseOr => f64::from(x != 0.0 || y != 0.0),
        BitwiseXor => f64::from((x != 0.0) != (y != 0.0)),
        Div => x / y,
        Eq => f64::from(x == y),
        Fmod => x % y,
        Ge => f64::from(x >= y),
        Gt => f64::from(x > y),
        Le => f64::from(x <= y),
        Lt => f64::from(x < y),
        Mul => x * y,
        Ne => f64::from(x != y),
        Pow => x.powf(y),
        Remainder => x - (x / y).floor() * y,
        Sub => x - y,
    }
}

fn complex_binary(op: BinaryOp, (ar, ai): (f64, f64), (br, bi): (f64, f64)) -> Vec<f64> {
    match op {
        BinaryOp::Add => vec![ar + br, ai + bi],
        BinaryOp::Sub => vec![ar - br, ai - bi],
        BinaryOp::Mul => vec![ar * br - ai * bi, ar * bi + ai * br],
        BinaryOp::Div => {
            let denom = br * br + bi * bi;
            vec![(ar * br + ai * bi) / denom, (ai * br - ar * bi) / denom]
        }
        BinaryOp::Eq => vec![f64::from(ar == br && ai == bi)],
        BinaryOp::Ne => vec![f64::from(ar != br || ai != bi)],
        _ => vec![f64::NAN, f64::NAN],
    }
}

pub fn elementwise_binary(op: BinaryOp, a: &Tensor, b: &Tensor) -> PrimResult<Tensor> {
    let out = meta::elementwise_binary(op, a.tensor_meta(), b.tensor_meta())?;
    let dtype = a.dtype();
    let values = if dtype.is_complex() {
        let lhs = a.complex_values(op.name())?;
        let rhs = b.complex_values(op.name())?;
        lhs.into_iter()
            .zip(rhs)
            .flat_map(|(x, y)| complex_binary(op, x, y))
            .collect()
    } else {
        let lhs = a.values(op.name())?;
        let rhs = b.values(op.name())?;
        if dtype.is_integer() {
            lhs.iter()
                .zip(rhs)
                .map(|(&x, &y)| integer_binary(op, x, y))
                .collect::<PrimResult<Vec<_>>>()?
        } else {
            lhs.iter()
                .zip(rhs)
                .map(|(&x, &y)| real_binary(op, x, y))
                .collect()
        }
    };
    Ok(materialize(out, values))
}

pub fn where_(pred: &Tensor, a: &Tensor, b: &Tensor) -> PrimResult<Tensor> {
    let out = meta::where_(pred.tensor_meta(), a.tensor_meta(), b.tensor_meta())?;
    let width = if out.dtype.is_complex() { 2 } else { 1 };
    let mask = pred.values("where")?;
    let lhs = a.values("where")?;
    let rhs = b.values("where")?;
    let values = mask
        .iter()
        .enumerate()
        .flat_map(|(i, &take_lhs)| {
            let source = if take_lhs != 0.0 { lhs } else { rhs };
            source[i * width..(i + 1) * width].iter().copied()
        })
        .collect();
    Ok(Tensor::from_parts(out, values))
}

pub fn broadcast_in_dim(
    a: &Tensor,
    shape: &[usize],
    broadcast_dimensions: &[usize],
) -> PrimResult<Tensor> {
    let out = meta::broadcast_in_dim(a.tensor_meta(), shape, broadcast_dimensions)?;
    let width = if out.dtype.is_complex() { 2 } else { 1 };
    let input = a.values("broadcast_in_dim")?;
    let in_dims = a.shape().dims();
    let in_strides = a.shape().strides();
    let mut values = Vec::with_capacity(out.storage_len());
    for index in 0..out.num_elements() {
        let coords = unravel_index(index, shape);
        let source = in_dims
            .iter()
            .zip(broadcast_dimensions)
            .zip(&in_strides)
            .map(|((&dim, &axis), &stride)| if dim == 1 { 0 } else { coords[axis] * stride })
            .sum::<usize>();
        values.extend_from_slice(&input[source * width..(source + 1) * width]);
    }
    Ok(Tensor::from_parts(out, values))
}

/// Casts to `dtype`. Complex to real conversion keeps the real component.
pub fn convert_element_type(a: &Tensor, dtype: DType) -> PrimResult<Tensor> {
    let out = meta::convert_element_type(a.tensor_meta(), dtype);
    let values = match (a.dtype().is_complex(), dtype.is_complex()) {
        (false, false) => a.values("convert_element_type")?.to_vec(),
        (true, true) => a.values("convert_element_type")?.to_vec(),
        (false, true) => a
            .complex_values("convert_element_type")?
            .into_iter()
            .flat_map(|(re, im)| [re, im])
            .collect(),
        (true, false) => a
            .complex_values("convert_element_type")?
            .into_iter()
            .map(|(re, _)| re)
            .collect(),
    };
    Ok(materialize(out, values))
}

/// Maps every input element to the flat index of the output element it reduces into.
fn reduction_index_map(dims: &[usize], reduced: &[usize]) -> Vec<usize> {
    let kept = (0..dims.len())
        .filter(|axis| !reduced.contains(axis))
        .collect::<Vec<_>>();
    let kept_dims = kept.iter().map(|&axis| dims[axis]).collect::<Vec<_>>();
    let out_strides = Shape::new(kept_dims).strides();
    let numel = dims.iter().product::<usize>();
    (0..numel)
        .map(|index| {
            let coords = unravel_index(index, dims);
            kept.iter()
                .zip(&out_strides)
                .map(|(&axis, &stride)| coords[axis] * stride)
                .sum()
        })
        .collect()
}

/// Groups `(re, im)` element values by output position.
fn reduction_groups(
    a: &Tensor,
    dims: &[usize],
    out: &TensorMeta,
    op: &str,
) -> PrimResult<Vec<Vec<(f64, f64)>>> {
    let mut groups = vec![Vec::new(); out.num_elements()];
    let map = reduction_index_map(a.shape().dims(), dims);
    for (value, target) in a.complex_values(op)?.into_iter().zip(map) {
        groups[target].push(value);
    }
    Ok(groups)
}

fn store(out: TensorMeta, values: impl IntoIterator<Item = (f64, f64)>) -> Tensor {
    let complex = out.dtype.is_complex();
    let flat = values
        .into_iter()
        .flat_map(|(re, im)| if complex { vec![re, im] } else { vec![re] })
        .collect();
    materialize(out, flat)
}

fn mean_of(group: &[(f64, f64)]) -> (f64, f64) {
    let n = group.len() as f64;
    let (re, im) = group
        .iter()
        .fold((0.0, 0.0), |(sr, si), &(re, im)| (sr + re, si + im));
    (re / n, im / n)
}

/// Sum of squared distances to the mean divided by `max(N - correction, 0)`.
fn variance_of(group: &[(f64, f64)], mean: (f64, f64), correction: i64) -> f64 {
    let squares = group
        .iter()
        .map(|&(re, im)| (re - mean.0).powi(2) + (im - mean.1).powi(2))
        .sum::<f64>();
    let divisor = (group.len() as i64 - correction).max(0) as f64;
    squares / divisor
}

pub fn sum(a: &Tensor, dims: &[usize]) -> PrimResult<Tensor> {
    let out = meta::sum(a.tensor_meta(), dims)?;
    let groups = reduction_groups(a, dims, &out, "sum")?;
    let sums = groups
        .iter()
        .map(|group| {
            group
                .iter()
                .fold((0.0, 0.0), |(sr, si), &(re, im)| (sr + re, si + im))
        })
        .collect::<Vec<_>>();
    Ok(store(out, sums))
}

pub fn var(a: &Tensor, dims: &[usize], correction: i64) -> PrimResult<Tensor> {
    let out = meta::var(a.tensor_meta(), dims, correction)?;
    let groups = reduction_groups(a, dims, &out, "var")?;
    let values = groups
        .iter()
        .map(|group| (variance_of(group, mean_of(group), correction), 0.0))
        .collect::<Vec<_>>();
    Ok(store(out, values))
}

/// Variance and mean in a single pass over the groups.
pub fn var_mean(a: &Tensor, dims: &[usize], correction: i64) -> PrimResult<(Tensor, Tensor)> {
    let (var_meta, mean_meta) = meta::var_mean(a.tensor_meta(), dims, correction)?;
    let groups = reduction_groups(a, dims, &mean_meta, "var_mean")?;
    let mut vars = Vec::with_capacity(groups.len());
    let mut means = Vec::with_capacity(groups.len());
    for group in &groups {
        let mean = mean_of(group);
        vars.push((variance_of(group, mean, correction), 0.0));
        means.push(mean);
    }
    Ok((store(var_meta, vars), store(mean_meta, means)))
}

fn extremum(
    out: TensorMeta,
    a: &Tensor,
    dims: &[usize],
    op: &str,
    pick: fn(f64, f64) -> f64,
) -> PrimResult<Tensor> {
    let groups = reduction_groups(a, dims, &out, op)?;
    let values = groups
        .iter()
        .map(|group| {
            let value = group
                .iter()
                .map(|&(re, _)| re)
                .reduce(|acc, x| {
                    if acc.is_nan() || x.is_nan() {
                        f64::NAN
                    } else {
                        pick(acc, x)
                    }
                })
                .unwrap_or(f64::NAN);
            (value, 0.0)
        })
        .collect::<Vec<_>>();
    Ok(store(out, values))
}

pub fn amax(a: &Tensor, dims: &[usize]) -> PrimResult<Tensor> {
    let out = meta::amax(a.tensor_meta(), dims)?;
    extremum(out, a, dims, "amax", f64::max)
}

pub fn amin(a: &Tensor, dims: &[usize]) -> PrimResult<Tensor> {
    let out = meta::amin(a.tensor_meta(), dims)?;
    extremum(out, a, dims, "amin", f64::min)
}
