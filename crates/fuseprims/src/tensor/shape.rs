//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stores the logical dimensions of a tensor. Rank zero denotes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        Shape { dims: dims.into() }
    }

    /// Shape of a rank-zero tensor.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major contiguous strides, measured in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.dims.len()];
        let mut stride = 1usize;
        for axis in (0..self.dims.len()).rev() {
            strides[axis] = stride;
            stride *= self.dims[axis];
        }
        strides
    }

    /// Returns a copy of this shape with the given (sorted, canonical) axes removed.
    pub fn without_axes(&self, axes: &[usize]) -> Shape {
        let dims = self
            .dims
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(_, dim)| *dim)
            .collect::<Vec<_>>();
        Shape { dims }
    }

    /// Returns a copy of this shape with the given axes forced to extent 1.
    pub fn with_unit_axes(&self, axes: &[usize]) -> Shape {
        let dims = self
            .dims
            .iter()
            .enumerate()
            .map(|(axis, dim)| if axes.contains(&axis) { 1 } else { *dim })
            .collect::<Vec<_>>();
        Shape { dims }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("[]");
        }
        let dims = self
            .dims
            .iter()
            .map(|dim| dim.to_string())
            .collect::<Vec<_>>()
            .join("x");
        f.write_str(&dims)
    }
}
