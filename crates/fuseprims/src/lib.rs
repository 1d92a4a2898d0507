//! Multi-backend operator dispatch registry for tensor primitives.
//!
//! Every catalog operation is bound to four realizations that agree on arity and parameter
//! meaning: meta (shape and dtype inference), reference (eager host kernels), autograd (backward
//! explicitly disabled) and a lowering into a fused-kernel IR. See [`registry::Registry`].

pub mod autograd;
pub mod config;
mod env;
pub mod error;
pub mod fusion;
pub mod ops;
pub mod prims;
pub mod registry;
pub mod tensor;

pub use config::RegistryConfig;
pub use error::{ConfigError, PrimError, PrimResult, RegistryError};
pub use fusion::{FusionBuilder, FusionDefinition, FusionTensor};
pub use prims::schema::CallArgs;
pub use prims::Outputs;
pub use registry::{OpHandle, Registry};
pub use tensor::{DType, Shape, Tensor, TensorMeta};
