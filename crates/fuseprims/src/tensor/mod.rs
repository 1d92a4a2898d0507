//! Tensor abstractions consumed by the registry.
//!
//! The registry does not own tensor storage semantics; this module provides the narrow surface it
//! needs: dtypes, shapes, metadata, and a host tensor that can also act as a meta tensor.

pub mod dtype;
mod host_tensor;
mod meta;
pub mod shape;

pub use dtype::DType;
pub use host_tensor::Tensor;
pub use meta::TensorMeta;
pub use shape::Shape;
