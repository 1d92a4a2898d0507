//! Operation handles: the externally visible, immutable dispatch targets.

use std::fmt;
use std::sync::Arc;

use crate::error::{PrimError, PrimResult};
use crate::fusion::{FusionBuilder, FusionTensor};
use crate::prims::schema::{BoundArgs, CallArgs, Schema};
use crate::prims::{Outputs, PrimDef, Realization, ReturnType};
use crate::tensor::Tensor;

use super::lowering::LoweringFn;

/// Which realization of an overload runs a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealizationKind {
    Meta,
    Reference,
    Autograd,
}

/// One call signature of an operation together with its four realizations.
pub struct Overload {
    name: String,
    schema: Schema,
    meta: Realization,
    reference: Realization,
    autograd: Realization,
    lowering: LoweringFn,
    meta_through_autograd: bool,
}

impl Overload {
    pub(crate) fn new(
        name: impl Into<String>,
        schema: Schema,
        meta: Realization,
        reference: Realization,
        autograd: Realization,
        lowering: LoweringFn,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            meta,
            reference,
            autograd,
            lowering,
            meta_through_autograd: false,
        }
    }

    /// Sends meta inputs through the autograd realization too. For composites whose autograd
    /// wrapper promotes or rejects inputs, so that shape inference sees the same rules as eager
    /// execution.
    pub(crate) fn with_meta_through_autograd(mut self) -> Self {
        self.meta_through_autograd = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The fused-kernel realization.
    pub fn lowering(&self) -> &LoweringFn {
        &self.lowering
    }

    pub fn realization(&self, kind: RealizationKind) -> &Realization {
        match kind {
            RealizationKind::Meta => &self.meta,
            RealizationKind::Reference => &self.reference,
            RealizationKind::Autograd => &self.autograd,
        }
    }

    /// Meta inputs select the meta realization unless the overload routes them through autograd.
    /// Everything else enters through autograd, which runs the reference realization with
    /// gradients disabled and marks outputs that would have joined a graph; the reference
    /// realization is only reached below that layer.
    pub fn select(&self, args: &BoundArgs<Tensor>) -> RealizationKind {
        if !self.meta_through_autograd && args.tensors().any(Tensor::is_meta) {
            RealizationKind::Meta
        } else {
            RealizationKind::Autograd
        }
    }

    /// Binds and dispatches an eager call.
    pub fn call(&self, args: CallArgs<Tensor>) -> PrimResult<Outputs<Tensor>> {
        let bound = self.schema.bind(args)?;
        self.dispatch(&bound)
    }

    /// Runs one specific realization, bypassing dispatch.
    pub fn call_realization(
        &self,
        kind: RealizationKind,
        args: CallArgs<Tensor>,
    ) -> PrimResult<Outputs<Tensor>> {
        let bound = self.schema.bind(args)?;
        let outputs = (self.realization(kind))(&bound)?;
        self.check_arity(outputs)
    }

    pub fn dispatch(&self, args: &BoundArgs<Tensor>) -> PrimResult<Outputs<Tensor>> {
        let outputs = (self.realization(self.select(args)))(args)?;
        self.check_arity(outputs)
    }

    /// Binds symbolic arguments and emits the fused-kernel lowering into `builder`.
    pub fn lower(
        &self,
        builder: &mut dyn FusionBuilder,
        args: CallArgs<FusionTensor>,
    ) -> PrimResult<Outputs<FusionTensor>> {
        let bound = self.schema.bind(args)?;
        let outputs = (self.lowering)(builder, &bound)?;
        self.check_arity(outputs)
    }

    fn check_arity<T>(&self, outputs: Outputs<T>) -> PrimResult<Outputs<T>> {
        let expected = self.schema.returns.arity();
        if outputs.arity() != expected {
            return Err(PrimError::ArityMismatch {
                op: self.schema.full_name(),
                expected,
                found: outputs.arity(),
            });
        }
        Ok(outputs)
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overload")
            .field("name", &self.name)
            .field("schema", &self.schema.to_string())
            .finish_non_exhaustive()
    }
}

/// Registered operation: documentation, return-type classification, the default lowering and an
/// ordered set of overloads. Immutable once registration completes.
pub struct OpHandle {
    namespace: String,
    name: String,
    doc: String,
    return_type: ReturnType,
    lowering: LoweringFn,
    overloads: Vec<Overload>,
    donor: Option<Arc<PrimDef>>,
}

impl OpHandle {
    pub(crate) fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        doc: impl Into<String>,
        return_type: ReturnType,
        lowering: LoweringFn,
        overloads: Vec<Overload>,
        donor: Option<Arc<PrimDef>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            doc: doc.into(),
            return_type,
            lowering,
            overloads,
            donor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `namespace::name`.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    /// The fused-kernel lowering advertised by the handle itself.
    pub fn lowering(&self) -> &LoweringFn {
        &self.lowering
    }

    /// Donor primitive this handle delegates to; `None` for composites.
    pub fn donor(&self) -> Option<&Arc<PrimDef>> {
        self.donor.as_ref()
    }

    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }

    pub fn overload(&self, name: &str) -> PrimResult<&Overload> {
        self.overloads
            .iter()
            .find(|overload| overload.name == name)
            .ok_or_else(|| {
                PrimError::invalid_argument(
                    self.qualified_name(),
                    format!("no overload named `{name}`"),
                )
            })
    }

    pub fn default_overload(&self) -> &Overload {
        &self.overloads[0]
    }

    /// Eager call resolved against the overloads in order; the first schema that binds wins.
    pub fn call(&self, args: CallArgs<Tensor>) -> PrimResult<Outputs<Tensor>> {
        let (overload, bound) = self.resolve(args)?;
        overload.dispatch(&bound)
    }

    /// Lowering call resolved the same way as [`OpHandle::call`].
    pub fn lower(
        &self,
        builder: &mut dyn FusionBuilder,
        args: CallArgs<FusionTensor>,
    ) -> PrimResult<Outputs<FusionTensor>> {
        let (overload, bound) = self.resolve(args)?;
        let outputs = (overload.lowering)(builder, &bound)?;
        overload.check_arity(outputs)
    }

    fn resolve<T: Clone>(&self, args: CallArgs<T>) -> PrimResult<(&Overload, BoundArgs<T>)> {
        let mut first_error = None;
        for overload in &self.overloads {
            match overload.schema.bind(args.clone()) {
                Ok(bound) => return Ok((overload, bound)),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| {
            PrimError::invalid_argument(self.qualified_name(), "operation has no overloads")
        }))
    }
}

impl fmt::Debug for OpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpHandle")
            .field("name", &self.qualified_name())
            .field("return_type", &self.return_type)
            .field("overloads", &self.overloads)
            .finish_non_exhaustive()
    }
}
