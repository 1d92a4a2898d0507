//! Donor primitive set: strict, non-broadcasting primitives with schemas, meta functions and
//! reference kernels.
//!
//! The registry re-declares these under its own namespace. A [`PrimDef`] is the explicit
//! cross-registry reference a registered handle keeps to its donor.

pub mod meta;
pub mod reference;
pub mod schema;
pub mod utils;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PrimError, PrimResult};
use crate::ops::{BinaryOp, TernaryOp, UnaryOp};
use crate::registry::mode;
use crate::tensor::Tensor;

use schema::{ArgSpec, ArgType, BoundArgs, CallArgs, Returns, Schema};

/// Namespace of the donor primitive set.
pub const PRIMS_NAMESPACE: &str = "prims";

/// One eager-side realization of an operation: bound arguments in, one or two tensors out.
pub type Realization =
    Arc<dyn Fn(&BoundArgs<Tensor>) -> PrimResult<Outputs<Tensor>> + Send + Sync>;

/// Results of a realization; arity is fixed by the schema's [`Returns`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outputs<T> {
    Single(T),
    Pair(T, T),
}

impl<T> Outputs<T> {
    pub fn arity(&self) -> usize {
        match self {
            Outputs::Single(_) => 1,
            Outputs::Pair(_, _) => 2,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Outputs<U> {
        match self {
            Outputs::Single(value) => Outputs::Single(f(value)),
            Outputs::Pair(first, second) => Outputs::Pair(f(first), f(second)),
        }
    }

    pub fn try_map<U>(self, mut f: impl FnMut(T) -> PrimResult<U>) -> PrimResult<Outputs<U>> {
        Ok(match self {
            Outputs::Single(value) => Outputs::Single(f(value)?),
            Outputs::Pair(first, second) => Outputs::Pair(f(first)?, f(second)?),
        })
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Outputs::Single(value) => vec![value],
            Outputs::Pair(first, second) => vec![first, second],
        }
    }

    pub fn into_single(self, op: &str) -> PrimResult<T> {
        match self {
            Outputs::Single(value) => Ok(value),
            Outputs::Pair(_, _) => Err(PrimError::ArityMismatch {
                op: op.to_string(),
                expected: 1,
                found: 2,
            }),
        }
    }

    pub fn into_pair(self, op: &str) -> PrimResult<(T, T)> {
        match self {
            Outputs::Pair(first, second) => Ok((first, second)),
            Outputs::Single(_) => Err(PrimError::ArityMismatch {
                op: op.to_string(),
                expected: 2,
                found: 1,
            }),
        }
    }
}

/// Whether an operation allocates its result or may alias its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    New,
    View,
}

/// A donor primitive: everything the registry needs to re-declare it.
pub struct PrimDef {
    pub schema: Schema,
    pub meta: Realization,
    pub reference: Realization,
    pub doc: String,
    pub return_type: ReturnType,
}

impl std::fmt::Debug for PrimDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimDef")
            .field("schema", &self.schema.to_string())
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

impl PrimDef {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Binds and runs the primitive: meta inputs go to the meta function, data to the kernel.
    ///
    /// Under an active [`LoweringMode`](crate::registry::LoweringMode) the call goes to the
    /// registry handle of the same name instead.
    pub fn call(&self, args: CallArgs<Tensor>) -> PrimResult<Outputs<Tensor>> {
        if let Some(handle) = mode::redirect(self.name()) {
            return handle.call(args);
        }
        let bound = self.schema.bind(args)?;
        if bound.tensors().any(Tensor::is_meta) {
            (self.meta)(&bound)
        } else {
            (self.reference)(&bound)
        }
    }
}

/// Name-keyed set of donor primitives.
#[derive(Debug)]
pub struct PrimTable {
    namespace: String,
    defs: Vec<Arc<PrimDef>>,
}

impl PrimTable {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            defs: Vec::new(),
        }
    }

    /// The standard primitive set: every elementwise, shape and reduction primitive the catalog
    /// re-declares (the composite `var_mean` has no donor).
    pub fn standard() -> Self {
        let mut table = Self::new(PRIMS_NAMESPACE);
        for &op in UnaryOp::ALL {
            table.insert(unary_prim(op));
        }
        for &op in BinaryOp::ALL {
            table.insert(binary_prim(op));
        }
        table.insert(broadcast_in_dim_prim());
        table.insert(where_prim());
        table.insert(convert_element_type_prim());
        table.insert(sum_prim());
        table.insert(var_prim());
        table.insert(amax_prim());
        table.insert(amin_prim());
        table
    }

    /// Adds or replaces a primitive.
    pub fn insert(&mut self, def: PrimDef) {
        self.defs.retain(|existing| existing.name() != def.name());
        self.defs.push(Arc::new(def));
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<PrimDef>> {
        let index = self.defs.iter().position(|def| def.name() == name)?;
        Some(self.defs.remove(index))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<PrimDef>> {
        self.defs.iter().find(|def| def.name() == name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|def| def.name())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn realization(
    f: impl Fn(&BoundArgs<Tensor>) -> PrimResult<Outputs<Tensor>> + Send + Sync + 'static,
) -> Realization {
    Arc::new(f)
}

fn single(meta: crate::tensor::TensorMeta) -> Outputs<Tensor> {
    Outputs::Single(Tensor::from_meta(meta))
}

fn reduction_axes(args: &BoundArgs<Tensor>) -> PrimResult<Vec<usize>> {
    let inp = args.tensor("inp")?;
    utils::reduction_dims(inp.shape(), args.opt_int_list("dims")?.as_deref())
}

fn unary_prim(op: UnaryOp) -> PrimDef {
    PrimDef {
        schema: Schema::new(op.name(), vec![ArgSpec::tensor("a")], Returns::Tensor),
        meta: realization(move |args| {
            Ok(single(meta::elementwise_unary(
                op,
                args.tensor("a")?.tensor_meta(),
            )?))
        }),
        reference: realization(move |args| {
            Ok(Outputs::Single(reference::elementwise_unary(
                op,
                args.tensor("a")?,
            )?))
        }),
        doc: format!(
            "Elementwise {op} of a tensor; the input is neither broadcast nor type promoted."
        ),
        return_type: ReturnType::New,
    }
}

fn binary_prim(op: BinaryOp) -> PrimDef {
    PrimDef {
        schema: Schema::new(
            op.name(),
            vec![ArgSpec::tensor("a"), ArgSpec::tensor("b")],
            Returns::Tensor,
        ),
        meta: realization(move |args| {
            Ok(single(meta::elementwise_binary(
                op,
                args.tensor("a")?.tensor_meta(),
                args.tensor("b")?.tensor_meta(),
            )?))
        }),
        reference: realization(move |args| {
            Ok(Outputs::Single(reference::elementwise_binary(
                op,
                args.tensor("a")?,
                args.tensor("b")?,
            )?))
        }),
        doc: format!(
            "Elementwise {op} of two tensors; operands must already share one shape and dtype."
        ),
        return_type: ReturnType::New,
    }
}

fn where_prim() -> PrimDef {
    let name = TernaryOp::Where.name();
    PrimDef {
        schema: Schema::new(
            name,
            vec![
                ArgSpec::tensor("pred"),
                ArgSpec::tensor("a"),
                ArgSpec::tensor("b"),
            ],
            Returns::Tensor,
        ),
        meta: realization(|args| {
            Ok(single(meta::where_(
                args.tensor("pred")?.tensor_meta(),
                args.tensor("a")?.tensor_meta(),
                args.tensor("b")?.tensor_meta(),
            )?))
        }),
        reference: realization(|args| {
            Ok(Outputs::Single(reference::where_(
                args.tensor("pred")?,
                args.tensor("a")?,
                args.tensor("b")?,
            )?))
        }),
        doc: "Selects elements from a where pred is true and from b elsewhere.".to_string(),
        return_type: ReturnType::New,
    }
}

fn broadcast_in_dim_prim() -> PrimDef {
    PrimDef {
        schema: Schema::new(
            "broadcast_in_dim",
            vec![
                ArgSpec::tensor("a"),
                ArgSpec::new("shape", ArgType::Shape),
                ArgSpec::new("broadcast_dimensions", ArgType::IntList { len: None }),
            ],
            Returns::Tensor,
        ),
        meta: realization(|args| {
            Ok(single(meta::broadcast_in_dim(
                args.tensor("a")?.tensor_meta(),
                &args.shape("shape")?,
                &args.axes("broadcast_dimensions")?,
            )?))
        }),
        reference: realization(|args| {
            Ok(Outputs::Single(reference::broadcast_in_dim(
                args.tensor("a")?,
                &args.shape("shape")?,
                &args.axes("broadcast_dimensions")?,
            )?))
        }),
        doc: "Creates a tensor of the given shape by broadcasting a. Input axis i maps to output \
              axis broadcast_dimensions[i]; every other output axis is new, and input axes of \
              size 1 may expand."
            .to_string(),
        return_type: ReturnType::View,
    }
}

fn convert_element_type_prim() -> PrimDef {
    PrimDef {
        schema: Schema::new(
            "convert_element_type",
            vec![ArgSpec::tensor("a"), ArgSpec::new("dtype", ArgType::DType)],
            Returns::Tensor,
        ),
        meta: realization(|args| {
            Ok(single(meta::convert_element_type(
                args.tensor("a")?.tensor_meta(),
                args.dtype("dtype")?,
            )))
        }),
        reference: realization(|args| {
            Ok(Outputs::Single(reference::convert_element_type(
                args.tensor("a")?,
                args.dtype("dtype")?,
            )?))
        }),
        doc: "Creates a copy of a tensor with the given dtype.".to_string(),
        return_type: ReturnType::New,
    }
}

fn reduction_schema(name: &str) -> Schema {
    Schema::new(
        name,
        vec![
            ArgSpec::tensor("inp"),
            ArgSpec::new("dims", ArgType::IntList { len: None }).optional(),
        ],
        Returns::Tensor,
    )
}

fn sum_prim() -> PrimDef {
    PrimDef {
        schema: reduction_schema("sum"),
        meta: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(single(meta::sum(args.tensor("inp")?.tensor_meta(), &dims)?))
        }),
        reference: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(Outputs::Single(reference::sum(args.tensor("inp")?, &dims)?))
        }),
        doc: "Computes the sum of elements in the input tensor over the list of dimensions \
              specified in the dims argument."
            .to_string(),
        return_type: ReturnType::New,
    }
}

fn var_prim() -> PrimDef {
    let mut schema = reduction_schema("var");
    schema
        .args
        .push(ArgSpec::new("correction", ArgType::Int).keyword_only());
    PrimDef {
        schema,
        meta: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(single(meta::var(
                args.tensor("inp")?.tensor_meta(),
                &dims,
                args.int("correction")?,
            )?))
        }),
        reference: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(Outputs::Single(reference::var(
                args.tensor("inp")?,
                &dims,
                args.int("correction")?,
            )?))
        }),
        doc: "Computes the biased variance of x over the list of dimensions specified in the dims \
              argument, with the given correction."
            .to_string(),
        return_type: ReturnType::New,
    }
}

fn amax_prim() -> PrimDef {
    PrimDef {
        schema: reduction_schema("amax"),
        meta: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(single(meta::amax(args.tensor("inp")?.tensor_meta(), &dims)?))
        }),
        reference: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(Outputs::Single(reference::amax(args.tensor("inp")?, &dims)?))
        }),
        doc: "Computes the maximum value of elements in the input tensor over the list of \
              dimensions specified in the dims argument."
            .to_string(),
        return_type: ReturnType::New,
    }
}

fn amin_prim() -> PrimDef {
    PrimDef {
        schema: reduction_schema("amin"),
        meta: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(single(meta::amin(args.tensor("inp")?.tensor_meta(), &dims)?))
        }),
        reference: realization(|args| {
            let dims = reduction_axes(args)?;
            Ok(Outputs::Single(reference::amin(args.tensor("inp")?, &dims)?))
        }),
        doc: "Computes the minimum value of elements in the input tensor over the list of \
              dimensions specified in the dims argument."
            .to_string(),
        return_type: ReturnType::New,
    }
}
