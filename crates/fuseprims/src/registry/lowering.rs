//! Lowering Table: one fused-kernel lowering per catalog operation.
//!
//! Elementwise entries come from a single generic binder instantiated per operator; shape and
//! reduction entries are written by hand. Reductions never keep reduced dimensions; keepdim
//! reconstruction belongs to the wrapping layer (see [`super::keepdim`]).

use std::fmt;
use std::sync::Arc;

use crate::error::{PrimError, PrimResult};
use crate::fusion::{
    FusionBuilder, FusionDType, FusionTensor, BROADCAST_IN_DIM_OPERATOR, CAST_OPERATOR,
    MAX_OPERATOR, MIN_OPERATOR, SUM_OPERATOR, VAR_MEAN_OPERATOR, VAR_OPERATOR, WHERE_OPERATOR,
};
use crate::ops::TernaryOp;
use crate::prims::schema::{BoundArgs, CallArgs, Schema};
use crate::prims::utils::{reduction_dims, set_correction};
use crate::prims::Outputs;

use super::catalog::{Catalog, CatalogOp, ReductionOp, ShapeOp};

/// Fused-kernel realization: emits backend nodes for already-bound arguments.
pub type LoweringFn = Arc<
    dyn Fn(&mut dyn FusionBuilder, &BoundArgs<FusionTensor>) -> PrimResult<Outputs<FusionTensor>>
        + Send
        + Sync,
>;

/// One lowering table row.
#[derive(Clone)]
pub struct LoweringEntry {
    pub name: String,
    /// Backend operators the lowering emits; what the capability checker verifies.
    pub backend_ops: Vec<&'static str>,
    pub lower: LoweringFn,
}

impl LoweringEntry {
    pub fn new<F>(name: impl Into<String>, backend_ops: Vec<&'static str>, lower: F) -> Self
    where
        F: Fn(&mut dyn FusionBuilder, &BoundArgs<FusionTensor>) -> PrimResult<Outputs<FusionTensor>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            backend_ops,
            lower: Arc::new(lower),
        }
    }
}

impl fmt::Debug for LoweringEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoweringEntry")
            .field("name", &self.name)
            .field("backend_ops", &self.backend_ops)
            .finish_non_exhaustive()
    }
}

/// Name-keyed lowering entries, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct LoweringTable {
    entries: Vec<LoweringEntry>,
}

impl LoweringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowerings for every operation of the standard catalog.
    pub fn standard() -> Self {
        Self::for_catalog(&Catalog::standard())
    }

    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self {
            entries: catalog.ops().iter().map(|op| standard_entry(*op)).collect(),
        }
    }

    /// Adds or replaces the entry for `entry.name`.
    pub fn insert(&mut self, entry: LoweringEntry) {
        self.entries.retain(|existing| existing.name != entry.name);
        self.entries.push(entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<LoweringEntry> {
        let index = self.entries.iter().position(|entry| entry.name == name)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&LoweringEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn entries(&self) -> &[LoweringEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowering for one catalog operation. The match is exhaustive, so a new catalog operator
/// without a lowering does not compile.
pub fn standard_entry(op: CatalogOp) -> LoweringEntry {
    match op {
        CatalogOp::Unary(op) => elementwise(op.name(), op.name(), 1, move |fd, operands| {
            fd.unary(op, operands[0])
        }),
        CatalogOp::Binary(op) => elementwise(op.name(), op.name(), 2, move |fd, operands| {
            fd.binary(op, operands[0], operands[1])
        }),
        CatalogOp::Ternary(TernaryOp::Where) => {
            elementwise(TernaryOp::Where.name(), WHERE_OPERATOR, 3, |fd, operands| {
                fd.where_(operands[0], operands[1], operands[2])
            })
        }
        CatalogOp::Shape(ShapeOp::BroadcastInDim) => broadcast_in_dim_lowering(),
        CatalogOp::Shape(ShapeOp::ConvertElementType) => convert_element_type_lowering(),
        CatalogOp::Reduction(ReductionOp::Sum) => sum_lowering(),
        CatalogOp::Reduction(ReductionOp::Var) => var_lowering(),
        CatalogOp::Reduction(ReductionOp::Amax) => amax_lowering(),
        CatalogOp::Reduction(ReductionOp::Amin) => amin_lowering(),
        CatalogOp::Reduction(ReductionOp::VarMean) => var_mean_lowering(),
    }
}

/// Generic binder for elementwise operators: collects `arity` tensor operands in schema order
/// and emits one backend node.
pub fn elementwise<F>(
    name: &'static str,
    backend_op: &'static str,
    arity: usize,
    emit: F,
) -> LoweringEntry
where
    F: Fn(&mut dyn FusionBuilder, &[&FusionTensor]) -> PrimResult<FusionTensor>
        + Send
        + Sync
        + 'static,
{
    LoweringEntry::new(name, vec![backend_op], move |fd, args| {
        let operands = args.tensors().collect::<Vec<_>>();
        if operands.len() != arity {
            return Err(PrimError::Schema {
                schema: args.schema_name().to_string(),
                detail: format!(
                    "{name} lowers {arity} tensor operand(s), got {}",
                    operands.len()
                ),
            });
        }
        Ok(Outputs::Single(emit(fd, &operands)?))
    })
}

fn broadcast_in_dim_lowering() -> LoweringEntry {
    LoweringEntry::new(
        ShapeOp::BroadcastInDim.name(),
        vec![BROADCAST_IN_DIM_OPERATOR],
        |fd, args| {
            let a = args.tensor("a")?;
            let shape = args.shape("shape")?;
            let broadcast_dimensions = args.axes("broadcast_dimensions")?;
            Ok(Outputs::Single(fd.broadcast_in_dim(
                a,
                &shape,
                &broadcast_dimensions,
            )?))
        },
    )
}

fn convert_element_type_lowering() -> LoweringEntry {
    LoweringEntry::new(
        ShapeOp::ConvertElementType.name(),
        vec![CAST_OPERATOR],
        |fd, args| {
            let dtype = FusionDType::from_dtype(args.dtype("dtype")?)?;
            Ok(Outputs::Single(fd.cast(args.tensor("a")?, dtype)?))
        },
    )
}

/// Canonical reduction dims for a lowering operand; `None` means every dim.
fn lowering_dims(a: &FusionTensor, dims: Option<Vec<i64>>) -> PrimResult<Vec<usize>> {
    reduction_dims(&a.meta.shape, dims.as_deref())
}

fn sum_lowering() -> LoweringEntry {
    LoweringEntry::new(ReductionOp::Sum.name(), vec![SUM_OPERATOR], |fd, args| {
        let a = args.tensor("inp")?;
        let dims = lowering_dims(a, args.opt_int_list("dims")?)?;
        Ok(Outputs::Single(fd.sum(a, &dims, false, FusionDType::Null)?))
    })
}

fn var_lowering() -> LoweringEntry {
    LoweringEntry::new(ReductionOp::Var.name(), vec![VAR_OPERATOR], |fd, args| {
        let a = args.tensor("inp")?;
        let dims = lowering_dims(a, args.opt_int_list("dims")?)?;
        let correction = args.int("correction")?;
        Ok(Outputs::Single(fd.var(a, &dims, correction, false)?))
    })
}

fn amax_lowering() -> LoweringEntry {
    LoweringEntry::new(ReductionOp::Amax.name(), vec![MAX_OPERATOR], |fd, args| {
        let a = args.tensor("inp")?;
        let dims = lowering_dims(a, args.opt_int_list("dims")?)?;
        Ok(Outputs::Single(fd.max(a, &dims, false)?))
    })
}

fn amin_lowering() -> LoweringEntry {
    LoweringEntry::new(ReductionOp::Amin.name(), vec![MIN_OPERATOR], |fd, args| {
        let a = args.tensor("inp")?;
        let dims = lowering_dims(a, args.opt_int_list("dims")?)?;
        Ok(Outputs::Single(fd.min(a, &dims, false)?))
    })
}

/// Full-form `var_mean` lowering. Expects the normalised form: `unbiased` unset and `correction`
/// given. `keepdim` is ignored; re-expansion happens outside the lowering.
fn var_mean_lowering() -> LoweringEntry {
    LoweringEntry::new(
        ReductionOp::VarMean.name(),
        vec![VAR_MEAN_OPERATOR],
        |fd, args| {
            if args.opt_bool("unbiased")?.is_some() {
                return Err(PrimError::invalid_argument(
                    "var_mean lowering",
                    "unbiased must be normalised into correction before lowering",
                ));
            }
            let correction = args.opt_int("correction")?.ok_or_else(|| {
                PrimError::invalid_argument("var_mean lowering", "correction is required")
            })?;
            let a = args.tensor("inp")?;
            let dims = lowering_dims(a, args.opt_int_list("dim")?)?;
            let (var, mean) = fd.var_mean(a, &dims, correction, false)?;
            Ok(Outputs::Pair(var, mean))
        },
    )
}

/// Lowering of the legacy `var_mean(inp, unbiased)` overload: normalises `unbiased` and calls
/// the full-form lowering with `dim = None`.
pub fn var_mean_unbiased_adapter(main_schema: Schema, main: LoweringFn) -> LoweringFn {
    Arc::new(move |fd: &mut dyn FusionBuilder, args: &BoundArgs<FusionTensor>| {
        let inp = args.tensor("inp")?.clone();
        let correction = set_correction(args.opt_bool("unbiased")?, None)?;
        let bound = main_schema.bind(
            CallArgs::<FusionTensor>::new()
                .arg(inp)
                .kwarg("dim", None::<Vec<i64>>)
                .kwarg("correction", correction),
        )?;
        main(fd, &bound)
    })
}
