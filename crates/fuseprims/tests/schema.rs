use anyhow::Result;
use fuseprims::prims::schema::{Arg, ArgSpec, ArgType, Returns, Schema};
use fuseprims::registry::var_mean::{default_schema, main_schema};
use fuseprims::{CallArgs, DType, PrimError, Registry, Tensor};

fn rendered(registry: &Registry, name: &str) -> Result<Vec<String>> {
    Ok(registry
        .op(name)?
        .overloads()
        .iter()
        .map(|overload| overload.schema().to_string())
        .collect())
}

#[test]
fn schemas_render_in_declaration_syntax() -> Result<()> {
    let registry = Registry::new()?;
    assert_eq!(rendered(&registry, "abs")?, ["abs(Tensor a) -> Tensor"]);
    assert_eq!(rendered(&registry, "add")?, ["add(Tensor a, Tensor b) -> Tensor"]);
    assert_eq!(
        rendered(&registry, "where")?,
        ["where(Tensor pred, Tensor a, Tensor b) -> Tensor"]
    );
    assert_eq!(
        rendered(&registry, "broadcast_in_dim")?,
        ["broadcast_in_dim(Tensor a, SymInt[] shape, int[] broadcast_dimensions) -> Tensor"]
    );
    assert_eq!(
        rendered(&registry, "convert_element_type")?,
        ["convert_element_type(Tensor a, ScalarType dtype) -> Tensor"]
    );
    assert_eq!(
        rendered(&registry, "sum")?,
        ["sum(Tensor inp, int[]? dims) -> Tensor"]
    );
    assert_eq!(
        rendered(&registry, "var")?,
        ["var(Tensor inp, int[]? dims, *, int correction) -> Tensor"]
    );
    assert_eq!(
        rendered(&registry, "var_mean")?,
        [
            "var_mean(Tensor inp, bool unbiased) -> (Tensor, Tensor)",
            "var_mean.main(Tensor inp, int[1]? dim=None, bool? unbiased=None, \
             bool keepdim=False, *, int? correction=None) -> (Tensor, Tensor)",
        ]
    );
    Ok(())
}

#[test]
fn var_mean_schemas_describe_the_registered_overloads() -> Result<()> {
    let registry = Registry::new()?;
    let var_mean = registry.op("var_mean")?;
    assert_eq!(var_mean.overload("default")?.schema(), &default_schema());
    assert_eq!(var_mean.overload("main")?.schema(), &main_schema());
    assert_eq!(main_schema().full_name(), "var_mean.main");
    assert_eq!(main_schema().returns.arity(), 2);
    Ok(())
}

#[test]
fn binding_fills_defaults_and_coerces_single_ints() -> Result<()> {
    let x = Tensor::zeros([2, 3], DType::F32);
    let bound = main_schema().bind(CallArgs::new().arg(&x).arg(1i64))?;
    assert_eq!(bound.schema_name(), "var_mean.main");
    assert_eq!(bound.opt_int_list("dim")?, Some(vec![1]));
    assert_eq!(bound.opt_bool("unbiased")?, None);
    assert!(!bound.bool("keepdim")?);
    assert_eq!(bound.opt_int("correction")?, None);
    assert_eq!(bound.tensors().count(), 1);

    let bound = main_schema().bind(
        CallArgs::new()
            .arg(&x)
            .kwarg("correction", 0i64)
            .kwarg("keepdim", true),
    )?;
    assert!(matches!(bound.get("dim"), Some(Arg::None)));
    assert_eq!(bound.opt_int("correction")?, Some(0));
    assert!(bound.bool("keepdim")?);
    Ok(())
}

fn expect_schema_error(result: fuseprims::PrimResult<impl std::fmt::Debug>, needle: &str) {
    match result {
        Err(PrimError::Schema { detail, .. }) => {
            assert!(detail.contains(needle), "`{detail}` lacks `{needle}`")
        }
        other => panic!("expected a schema error mentioning `{needle}`, got {other:?}"),
    }
}

#[test]
fn binding_rejects_malformed_calls() {
    let x = Tensor::zeros([2, 3], DType::F32);
    let schema = main_schema();

    expect_schema_error(
        schema.bind(CallArgs::<Tensor>::new()),
        "missing required argument `inp`",
    );
    expect_schema_error(
        schema.bind(CallArgs::new().arg(&x).kwarg("dims", vec![0i64])),
        "unexpected keyword argument `dims`",
    );
    expect_schema_error(
        schema.bind(CallArgs::new().arg(&x).arg(vec![0i64]).kwarg("dim", vec![1i64])),
        "multiple values for argument `dim`",
    );
    expect_schema_error(
        schema.bind(
            CallArgs::new()
                .arg(&x)
                .arg(vec![0i64])
                .arg(true)
                .arg(false)
                .arg(1i64),
        ),
        "at most 4 positional",
    );
    expect_schema_error(
        schema.bind(CallArgs::new().arg(&x).kwarg("keepdim", 1i64)),
        "argument `keepdim` expects bool",
    );
    expect_schema_error(
        default_schema().bind(CallArgs::new().arg(&x).arg(Arg::None)),
        "argument `unbiased` expects bool",
    );
}

#[test]
fn shape_arguments_reject_negative_extents() -> Result<()> {
    let registry = Registry::new()?;
    let x = Tensor::zeros([3], DType::F32);
    let err = registry
        .op("broadcast_in_dim")?
        .call(CallArgs::new().arg(&x).arg(vec![2i64, -3]).arg(vec![1i64]))
        .expect_err("negative extent must be rejected");
    assert!(
        matches!(&err, PrimError::Schema { detail, .. } if detail.contains("negative extent -3")),
        "{err}"
    );
    Ok(())
}

#[test]
fn broadcast_dimensions_must_be_non_negative() -> Result<()> {
    let registry = Registry::new()?;
    let x = Tensor::zeros([3], DType::F32);
    let err = registry
        .op("broadcast_in_dim")?
        .call(CallArgs::new().arg(&x).arg(vec![2i64, 3]).arg(vec![-1i64]))
        .expect_err("negative axis must be rejected");
    assert!(matches!(err, PrimError::Schema { .. }), "{err}");
    Ok(())
}

#[test]
fn unresolvable_call_reports_first_overload_error() -> Result<()> {
    let registry = Registry::new()?;
    let x = Tensor::zeros([2, 3], DType::F32);
    let err = registry
        .op("var_mean")?
        .call(CallArgs::new().arg(&x).kwarg("bogus", true))
        .expect_err("no overload accepts `bogus`");
    assert!(
        matches!(&err, PrimError::Schema { schema, .. } if schema.starts_with("var_mean(")),
        "{err}"
    );
    Ok(())
}

#[test]
fn custom_schema_renders_keyword_marker_once() {
    let schema = Schema::new(
        "clamp",
        vec![
            ArgSpec::tensor("a"),
            ArgSpec::new("lo", ArgType::Int).keyword_only(),
            ArgSpec::new("hi", ArgType::Int).keyword_only(),
        ],
        Returns::Tensor,
    )
    .with_overload("int");
    assert_eq!(
        schema.to_string(),
        "clamp.int(Tensor a, *, int lo, int hi) -> Tensor"
    );
    assert!(schema.same_signature(&Schema::new(
        "other",
        schema.args.clone(),
        Returns::Tensor
    )));
}

#[test]
fn schemas_serialize_for_manifests() -> Result<()> {
    let json = serde_json::to_value(main_schema())?;
    assert_eq!(json["name"], "var_mean");
    assert_eq!(json["overload"], "main");
    assert_eq!(json["returns"], "TensorPair");
    assert_eq!(json["args"][1]["name"], "dim");
    assert_eq!(json["args"][1]["ty"]["IntList"]["len"], 1);
    assert_eq!(json["args"][1]["default"], "None");
    assert_eq!(json["args"][4]["kw_only"], true);

    let json = serde_json::to_value(default_schema())?;
    assert!(json["overload"].is_null());
    assert_eq!(json["args"].as_array().map(Vec::len), Some(2));
    Ok(())
}
