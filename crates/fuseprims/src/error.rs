//! Error taxonomy for registration, dispatch and lowering.
//!
//! Registration-time failures ([`RegistryError`]) abort building a
//! [`Registry`](crate::registry::Registry). Call-time failures ([`PrimError`]) are raised by the
//! handle that detected them; each contract violation has its own variant so callers can match on
//! the capability gap instead of parsing messages.

use thiserror::Error;

use crate::tensor::DType;

/// Failure raised while invoking a realization of a registered operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrimError {
    /// Caller supplied conflicting or malformed parameters (e.g. both `unbiased` and `correction`).
    #[error("invalid argument to {op}: {detail}")]
    InvalidArgument { op: String, detail: String },

    /// The operation is defined but deliberately does not handle this input class.
    #[error("{op} is not implemented: {reason}")]
    NotImplemented { op: String, reason: String },

    /// Gradient propagation was requested through an operation that disables autograd.
    #[error("backward is not supported through {op}")]
    BackwardNotSupported { op: String },

    /// `backward` was requested on a tensor that never tracked gradients.
    #[error("tensor does not require grad and has no grad_fn")]
    NotDifferentiable,

    #[error("{op} does not support dtype {dtype}")]
    DTypeNotSupported { op: String, dtype: DType },

    #[error("{op} expects operands of matching dtype, got {lhs} and {rhs}")]
    DTypeMismatch { op: String, lhs: DType, rhs: DType },

    #[error("shape error in {op}: {detail}")]
    Shape { op: String, detail: String },

    /// Arguments could not be bound against the operation schema.
    #[error("cannot call {schema}: {detail}")]
    Schema { schema: String, detail: String },

    /// A realization produced a different number of outputs than its schema declares.
    #[error("{op} produced {found} output(s) but its schema declares {expected}")]
    ArityMismatch {
        op: String,
        expected: usize,
        found: usize,
    },

    /// Data was requested from a tensor that only carries metadata.
    #[error("{op} requires tensor data but received a meta tensor")]
    MetaTensor { op: String },

    /// No fused-kernel backend is configured, so lowerings cannot be executed.
    #[error("no fusion backend is available")]
    FusionUnavailable,

    #[error("fusion error: {0}")]
    Fusion(String),
}

impl PrimError {
    pub fn invalid_argument(op: impl Into<String>, detail: impl Into<String>) -> Self {
        PrimError::InvalidArgument {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn not_implemented(op: impl Into<String>, reason: impl Into<String>) -> Self {
        PrimError::NotImplemented {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn dtype_not_supported(op: impl Into<String>, dtype: DType) -> Self {
        PrimError::DTypeNotSupported {
            op: op.into(),
            dtype,
        }
    }

    pub fn shape(op: impl Into<String>, detail: impl Into<String>) -> Self {
        PrimError::Shape {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn fusion(message: impl Into<String>) -> Self {
        PrimError::Fusion(message.into())
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, PrimError::NotImplemented { .. })
    }

    pub fn is_backward_not_supported(&self) -> bool {
        matches!(self, PrimError::BackwardNotSupported { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, PrimError::InvalidArgument { .. })
    }
}

/// Convenience alias for results returned by realizations.
pub type PrimResult<T> = Result<T, PrimError>;

/// Failure raised while building the registry. These never surface at call time.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("catalog operation `{name}` has no lowering table entry")]
    MissingLowering { name: String },

    #[error("lowering table entry `{name}` has no catalog operation")]
    OrphanLowering { name: String },

    #[error("donor namespace `{namespace}` has no primitive `{name}`")]
    MissingPrimitive { namespace: String, name: String },

    /// A composite operation needs another catalog operation that was not registered.
    #[error("operation `{name}` depends on `{dependency}`, which is not registered")]
    MissingDependency { name: String, dependency: String },

    #[error("operation `{name}` registered twice")]
    DuplicateRegistration { name: String },

    /// The fusion backend is present but does not expose every operator the table emits.
    #[error("fusion backend `{backend}` is missing operators: {}", missing.join(", "))]
    CapabilityMismatch {
        backend: String,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure raised while reading registry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid registry config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}
