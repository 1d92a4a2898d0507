use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DType, Shape};

/// Tensor metadata coupling dtype and shape; everything a meta realization may look at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorMeta {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Number of `f64` slots needed to store the tensor on the host.
    pub fn storage_len(&self) -> usize {
        if self.dtype.is_complex() {
            self.num_elements() * 2
        } else {
            self.num_elements()
        }
    }
}

impl fmt::Display for TensorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{} x {}>", self.dtype, self.shape)
    }
}
