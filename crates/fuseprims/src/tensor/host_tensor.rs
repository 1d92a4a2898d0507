//! Host-backed tensor used by reference realizations, meta inference and tests.

use std::sync::Arc;

use super::{DType, Shape, TensorMeta};
use crate::autograd::GradFn;
use crate::error::{PrimError, PrimResult};

/// Dense row-major tensor, or a meta tensor when no storage is attached.
///
/// Values are held as `f64` regardless of dtype and are rounded to the dtype on construction.
/// Complex tensors interleave real and imaginary components.
#[derive(Debug, Clone)]
pub struct Tensor {
    meta: TensorMeta,
    storage: Option<Arc<[f64]>>,
    requires_grad: bool,
    grad_fn: Option<GradFn>,
}

impl Tensor {
    /// Constructs a tensor from raw values, validating the length against the shape.
    pub fn from_vec(shape: impl Into<Shape>, dtype: DType, values: Vec<f64>) -> PrimResult<Self> {
        let meta = TensorMeta::new(dtype, shape);
        if values.len() != meta.storage_len() {
            return Err(PrimError::shape(
                "tensor",
                format!(
                    "data length ({}) does not match {} (expected {})",
                    values.len(),
                    meta,
                    meta.storage_len()
                ),
            ));
        }
        let values = values
            .into_iter()
            .map(|value| dtype.round_value(value))
            .collect::<Vec<_>>();
        Ok(Self::from_parts(meta, values))
    }

    /// Constructs an `F32` tensor.
    pub fn from_f32(shape: impl Into<Shape>, values: Vec<f32>) -> PrimResult<Self> {
        Self::from_vec(
            shape,
            DType::F32,
            values.into_iter().map(f64::from).collect(),
        )
    }

    /// Constructs a complex tensor from `(re, im)` pairs.
    pub fn from_complex(
        shape: impl Into<Shape>,
        dtype: DType,
        values: Vec<(f64, f64)>,
    ) -> PrimResult<Self> {
        if !dtype.is_complex() {
            return Err(PrimError::dtype_not_supported("tensor.from_complex", dtype));
        }
        let interleaved = values
            .into_iter()
            .flat_map(|(re, im)| [re, im])
            .collect::<Vec<_>>();
        Self::from_vec(shape, dtype, interleaved)
    }

    /// Tensor of the given shape filled with `value` (real part for complex dtypes).
    pub fn full(shape: impl Into<Shape>, dtype: DType, value: f64) -> Self {
        let meta = TensorMeta::new(dtype, shape);
        let values = if dtype.is_complex() {
            (0..meta.num_elements())
                .flat_map(|_| [dtype.round_value(value), 0.0])
                .collect()
        } else {
            vec![dtype.round_value(value); meta.num_elements()]
        };
        Self::from_parts(meta, values)
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::full(shape, dtype, 0.0)
    }

    pub fn scalar(dtype: DType, value: f64) -> Self {
        Self::full(Shape::scalar(), dtype, value)
    }

    /// Creates a meta tensor: metadata only, no storage.
    pub fn meta(dtype: DType, shape: impl Into<Shape>) -> Self {
        Tensor {
            meta: TensorMeta::new(dtype, shape),
            storage: None,
            requires_grad: false,
            grad_fn: None,
        }
    }

    pub fn from_meta(meta: TensorMeta) -> Self {
        Tensor {
            meta,
            storage: None,
            requires_grad: false,
            grad_fn: None,
        }
    }

    pub(crate) fn from_parts(meta: TensorMeta, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), meta.storage_len());
        Tensor {
            meta,
            storage: Some(Arc::from(values)),
            requires_grad: false,
            grad_fn: None,
        }
    }

    /// Reinterprets the tensor under a new shape with the same element count.
    pub fn reshape(&self, shape: impl Into<Shape>) -> PrimResult<Tensor> {
        let shape = shape.into();
        if shape.num_elements() != self.numel() {
            return Err(PrimError::shape(
                "reshape",
                format!("cannot view {} as shape {}", self.meta, shape),
            ));
        }
        Ok(Tensor {
            meta: TensorMeta::new(self.dtype(), shape),
            ..self.clone()
        })
    }

    /// Returns a storage-free copy carrying the same metadata.
    pub fn to_meta(&self) -> Tensor {
        Tensor {
            storage: None,
            ..self.clone()
        }
    }

    pub fn tensor_meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.meta.shape
    }

    pub fn rank(&self) -> usize {
        self.meta.rank()
    }

    pub fn numel(&self) -> usize {
        self.meta.num_elements()
    }

    pub fn is_meta(&self) -> bool {
        self.storage.is_none()
    }

    /// Borrow the raw storage; fails for meta tensors.
    pub fn values(&self, op: &str) -> PrimResult<&[f64]> {
        self.storage
            .as_deref()
            .ok_or_else(|| PrimError::MetaTensor { op: op.to_string() })
    }

    /// Copies the storage out, or `None` for meta tensors.
    pub fn to_vec(&self) -> Option<Vec<f64>> {
        self.storage.as_deref().map(<[f64]>::to_vec)
    }

    /// Complex view of the storage; real tensors get a zero imaginary part.
    pub fn complex_values(&self, op: &str) -> PrimResult<Vec<(f64, f64)>> {
        let values = self.values(op)?;
        if self.dtype().is_complex() {
            Ok(values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
        } else {
            Ok(values.iter().map(|&re| (re, 0.0)).collect())
        }
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Marks the tensor as a gradient-tracking leaf.
    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn grad_fn(&self) -> Option<&GradFn> {
        self.grad_fn.as_ref()
    }

    pub(crate) fn with_grad_fn(mut self, grad_fn: GradFn) -> Self {
        self.requires_grad = true;
        self.grad_fn = Some(grad_fn);
        self
    }

    /// Starts backpropagation from this tensor.
    ///
    /// The registry disables autograd for every realization it owns, so the only graph nodes a
    /// tensor can carry are markers that reject the request.
    pub fn backward(&self) -> PrimResult<()> {
        match &self.grad_fn {
            Some(grad_fn) => grad_fn.apply(),
            None if self.requires_grad => Ok(()),
            None => Err(PrimError::NotDifferentiable),
        }
    }

    /// Element-wise closeness check used by parity tests.
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64) -> bool {
        if self.meta != other.meta {
            return false;
        }
        match (self.storage.as_deref(), other.storage.as_deref()) {
            (Some(lhs), Some(rhs)) => lhs.iter().zip(rhs.iter()).all(|(&a, &b)| {
                if a.is_nan() || b.is_nan() {
                    return a.is_nan() && b.is_nan();
                }
                if a.is_infinite() || b.is_infinite() {
                    return a == b;
                }
                (a - b).abs() <= atol + rtol * b.abs()
            }),
            (None, None) => true,
            _ => false,
        }
    }
}
