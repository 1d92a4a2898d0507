//! `var_mean`: the one composite operation, with a legacy `(inp, unbiased)` overload and a
//! full-form `main` overload that folds `dim`, `unbiased`, `keepdim` and `correction` together.

use std::sync::Arc;

use crate::autograd::backwards_not_supported;
use crate::error::{PrimError, PrimResult};
use crate::prims::schema::{ArgDefault, ArgSpec, ArgType, BoundArgs, CallArgs, Returns, Schema};
use crate::prims::utils::{
    elementwise_dtypes, reduction_dims, set_correction, TypePromotionKind,
};
use crate::prims::{meta, reference, Outputs, PrimDef, Realization, ReturnType};
use crate::tensor::{DType, Tensor};

use super::handle::{OpHandle, Overload};
use super::keepdim::restore_reduced_dims;
use super::lowering::{var_mean_unbiased_adapter, LoweringEntry};
use super::mode::{HandleMap, LoweringMode};

pub const VAR_MEAN_NAME: &str = "var_mean";

pub const VAR_MEAN_DOC: &str =
    "Computes the variance and mean of x over the list of dimensions specified in the dim argument";

/// `var_mean(Tensor inp, bool unbiased) -> (Tensor, Tensor)`. Registered first so that
/// `(tensor, bool)` calls resolve here.
pub fn default_schema() -> Schema {
    Schema::new(
        VAR_MEAN_NAME,
        vec![ArgSpec::tensor("inp"), ArgSpec::new("unbiased", ArgType::Bool)],
        Returns::TensorPair,
    )
}

/// `var_mean.main(Tensor inp, int[1]? dim=None, bool? unbiased=None, bool keepdim=False, *,
/// int? correction=None) -> (Tensor, Tensor)`.
pub fn main_schema() -> Schema {
    Schema::new(
        VAR_MEAN_NAME,
        vec![
            ArgSpec::tensor("inp"),
            ArgSpec::new("dim", ArgType::IntList { len: Some(1) })
                .optional()
                .with_default(ArgDefault::None),
            ArgSpec::new("unbiased", ArgType::Bool)
                .optional()
                .with_default(ArgDefault::None),
            ArgSpec::new("keepdim", ArgType::Bool).with_default(ArgDefault::Bool(false)),
            ArgSpec::new("correction", ArgType::Int)
                .optional()
                .with_default(ArgDefault::None)
                .keyword_only(),
        ],
        Returns::TensorPair,
    )
    .with_overload("main")
}

/// Primitives `var_mean` calls into while re-expanding or converting values.
///
/// Calls always name the donor primitive; under this registry's [`LoweringMode`] they resolve to
/// the registered handles in `handles`.
pub(crate) struct VarMeanDeps {
    pub namespace: String,
    pub handles: Arc<HandleMap>,
    pub broadcast_in_dim: Arc<PrimDef>,
    pub convert_element_type: Arc<PrimDef>,
}

impl VarMeanDeps {
    fn convert(&self, a: &Tensor, dtype: DType) -> PrimResult<Tensor> {
        self.convert_element_type
            .call(CallArgs::new().arg(a).arg(dtype))?
            .into_single("convert_element_type")
    }

    fn keepdim(
        &self,
        (var, mean): (Tensor, Tensor),
        input_dims: &[usize],
        reduced: &[usize],
    ) -> PrimResult<(Tensor, Tensor)> {
        let broadcast = |value: Tensor, shape: &[usize], dims: &[usize]| {
            self.broadcast_in_dim
                .call(CallArgs::new().arg(value).arg(shape).arg(dims))?
                .into_single("broadcast_in_dim")
        };
        Ok((
            restore_reduced_dims(var, input_dims, reduced, broadcast)?,
            restore_reduced_dims(mean, input_dims, reduced, broadcast)?,
        ))
    }
}

/// Arguments of a `main` call after correction normalisation and dim resolution.
struct MainArgs<'a> {
    inp: &'a Tensor,
    dims: Vec<usize>,
    keepdim: bool,
    correction: i64,
}

impl<'a> MainArgs<'a> {
    fn parse(args: &'a BoundArgs<Tensor>) -> PrimResult<Self> {
        let inp = args.tensor("inp")?;
        let correction = set_correction(args.opt_bool("unbiased")?, args.opt_int("correction")?)?;
        let dims = reduction_dims(inp.shape(), args.opt_int_list("dim")?.as_deref())?;
        Ok(Self {
            inp,
            dims,
            keepdim: args.bool("keepdim")?,
            correction,
        })
    }
}

fn finish(
    deps: &VarMeanDeps,
    pair: (Tensor, Tensor),
    parsed: &MainArgs<'_>,
) -> PrimResult<Outputs<Tensor>> {
    let (var, mean) = if parsed.keepdim {
        deps.keepdim(pair, parsed.inp.shape().dims(), &parsed.dims)?
    } else {
        pair
    };
    Ok(Outputs::Pair(var, mean))
}

fn meta_realization(deps: Arc<VarMeanDeps>) -> Realization {
    Arc::new(move |args: &BoundArgs<Tensor>| {
        let parsed = MainArgs::parse(args)?;
        let (var, mean) =
            meta::var_mean(parsed.inp.tensor_meta(), &parsed.dims, parsed.correction)?;
        finish(
            &deps,
            (Tensor::from_meta(var), Tensor::from_meta(mean)),
            &parsed,
        )
    })
}

fn reference_realization(deps: Arc<VarMeanDeps>) -> Realization {
    Arc::new(move |args: &BoundArgs<Tensor>| {
        let parsed = MainArgs::parse(args)?;
        let pair = reference::var_mean(parsed.inp, &parsed.dims, parsed.correction)?;
        finish(&deps, pair, &parsed)
    })
}

/// Below-autograd dispatch of the `main` overload: meta inputs to meta, data to reference.
fn below_autograd(meta: Realization, reference: Realization) -> Realization {
    Arc::new(move |args: &BoundArgs<Tensor>| {
        if args.tensors().any(Tensor::is_meta) {
            meta(args)
        } else {
            reference(args)
        }
    })
}

/// Type-promoting wrapper run by the autograd realization. Reductions go through `prim` without
/// keepdim; re-expansion and result conversion happen here.
fn var_mean_ref(
    deps: &VarMeanDeps,
    main_schema: &Schema,
    prim: &Realization,
    args: &BoundArgs<Tensor>,
) -> PrimResult<Outputs<Tensor>> {
    let inp = args.tensor("inp")?;
    let (computation, result) =
        elementwise_dtypes(&[inp.dtype()], TypePromotionKind::ComplexToFloat)?;
    let a = if inp.dtype() == computation {
        inp.clone()
    } else {
        deps.convert(inp, computation)?
    };

    let correction = set_correction(args.opt_bool("unbiased")?, args.opt_int("correction")?)?;
    let dims = reduction_dims(a.shape(), args.opt_int_list("dim")?.as_deref())?;

    if a.dtype().is_complex() {
        return Err(PrimError::not_implemented(
            VAR_MEAN_NAME,
            "complex tensors are not supported",
        ));
    }

    let bound = main_schema.bind(
        CallArgs::new()
            .arg(&a)
            .arg(dims.as_slice())
            .kwarg("correction", correction),
    )?;
    let mut pair = prim(&bound)?.into_pair(VAR_MEAN_NAME)?;
    if args.bool("keepdim")? {
        pair = deps.keepdim(pair, a.shape().dims(), &dims)?;
    }

    let (var, mean) = pair;
    let restore = |value: Tensor| {
        if value.dtype() == result {
            Ok(value)
        } else {
            deps.convert(&value, result)
        }
    };
    Ok(Outputs::Pair(restore(var)?, restore(mean)?))
}

fn autograd_realization(
    deps: Arc<VarMeanDeps>,
    main_schema: Schema,
    prim: Realization,
    qualified_name: String,
) -> Realization {
    let namespace = deps.namespace.clone();
    let handles = Arc::clone(&deps.handles);
    let wrapper: Realization = Arc::new(move |args: &BoundArgs<Tensor>| {
        var_mean_ref(&deps, &main_schema, &prim, args)
    });
    let guarded = backwards_not_supported(qualified_name, wrapper);
    Arc::new(move |args: &BoundArgs<Tensor>| {
        let _mode = LoweringMode::enter(&namespace, Arc::clone(&handles));
        guarded(args)
    })
}

/// Realization of the legacy overload: forwards to `target` as `main(inp, dim=None, unbiased)`.
fn unbiased_overload(main_schema: Schema, target: Realization) -> Realization {
    Arc::new(move |args: &BoundArgs<Tensor>| {
        let bound = main_schema.bind(
            CallArgs::new()
                .arg(args.tensor("inp")?)
                .kwarg("dim", None::<Vec<i64>>)
                .kwarg("unbiased", args.bool("unbiased")?),
        )?;
        target(&bound)
    })
}

/// Builds the `var_mean` handle from its lowering entry and the handles it calls into.
pub(crate) fn build_var_mean(entry: &LoweringEntry, deps: VarMeanDeps) -> OpHandle {
    let deps = Arc::new(deps);
    let namespace = deps.namespace.clone();
    let qualified_name = format!("{namespace}::{VAR_MEAN_NAME}");
    let main_schema = main_schema();

    let meta = meta_realization(Arc::clone(&deps));
    let reference = reference_realization(Arc::clone(&deps));
    let prim = below_autograd(meta.clone(), reference.clone());
    let autograd = autograd_realization(
        Arc::clone(&deps),
        main_schema.clone(),
        prim,
        qualified_name,
    );

    let default = Overload::new(
        "default",
        default_schema(),
        unbiased_overload(main_schema.clone(), meta.clone()),
        unbiased_overload(main_schema.clone(), reference.clone()),
        unbiased_overload(main_schema.clone(), autograd.clone()),
        var_mean_unbiased_adapter(main_schema.clone(), entry.lower.clone()),
    )
    .with_meta_through_autograd();
    let main = Overload::new(
        "main",
        main_schema,
        meta,
        reference,
        autograd,
        entry.lower.clone(),
    )
    .with_meta_through_autograd();

    OpHandle::new(
        namespace,
        VAR_MEAN_NAME,
        VAR_MEAN_DOC,
        ReturnType::New,
        entry.lower.clone(),
        vec![default, main],
        None,
    )
}
