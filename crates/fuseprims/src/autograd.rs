//! Minimal autograd boundary: grad mode and the backward-disabling wrapper.
//!
//! Gradient computation through registry operations is unsupported. Realizations produced by
//! [`backwards_not_supported`] still compute forward values, but any output that would have joined
//! an autograd graph is tagged with a [`GradFn`] that fails on `backward`.

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{PrimError, PrimResult};
use crate::prims::schema::BoundArgs;
use crate::prims::Realization;
use crate::tensor::Tensor;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Reports whether gradient tracking is enabled on the current thread.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Restores the previous grad mode when dropped.
#[must_use = "grad mode is restored as soon as the guard is dropped"]
pub struct GradModeGuard {
    previous: bool,
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|flag| flag.set(self.previous));
    }
}

fn set_grad_enabled(enabled: bool) -> GradModeGuard {
    let previous = GRAD_ENABLED.with(|flag| flag.replace(enabled));
    GradModeGuard { previous }
}

/// Disables gradient tracking until the guard is dropped.
pub fn no_grad() -> GradModeGuard {
    set_grad_enabled(false)
}

/// Re-enables gradient tracking until the guard is dropped.
pub fn enable_grad() -> GradModeGuard {
    set_grad_enabled(true)
}

/// Backward node attached to outputs of autograd-disabled realizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradFn {
    NotSupported { op: Arc<str> },
}

impl GradFn {
    pub fn not_supported(op: &str) -> Self {
        GradFn::NotSupported { op: Arc::from(op) }
    }

    pub(crate) fn apply(&self) -> PrimResult<()> {
        match self {
            GradFn::NotSupported { op } => Err(PrimError::BackwardNotSupported {
                op: op.to_string(),
            }),
        }
    }
}

fn any_requires_grad(args: &BoundArgs<Tensor>) -> bool {
    args.tensors().any(Tensor::requires_grad)
}

/// Wraps `forward` so that it runs with gradients disabled and rejects backpropagation.
///
/// When grad mode is on and any tensor argument requires grad, outputs are tagged with
/// [`GradFn::NotSupported`]; calling `backward` on them fails with
/// [`PrimError::BackwardNotSupported`] naming `op`.
pub fn backwards_not_supported(op: impl Into<String>, forward: Realization) -> Realization {
    let op: String = op.into();
    Arc::new(move |args: &BoundArgs<Tensor>| {
        let track = is_grad_enabled() && any_requires_grad(args);
        let outputs = {
            let _guard = no_grad();
            forward(args)?
        };
        if track {
            Ok(outputs.map(|tensor| tensor.with_grad_fn(GradFn::not_supported(&op))))
        } else {
            Ok(outputs)
        }
    })
}
