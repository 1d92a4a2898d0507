#[path = "../../fuseprims/tests/common/mod.rs"]
mod common;

use anyhow::Result;
use fuseprims::fusion::backend::{has_fusion_backend, FusionBackend};
use fuseprims::{
    CallArgs, DType, FusionBuilder, FusionDefinition, PrimError, Registry, RegistryConfig, Tensor,
    TensorMeta,
};
use fuseprims_backend_ref::{register_reference_backend, ReferenceFusionBackend, BACKEND_NAME};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn registry_with_backend() -> Result<Registry> {
    register_reference_backend();
    let config = RegistryConfig::default().with_fusion_backend(BACKEND_NAME);
    let registry = Registry::builder(config).build()?;
    assert!(registry.fusion_backend().is_some());
    Ok(registry)
}

fn assert_all_close(actual: &[Tensor], expected: &[Tensor], context: &str) {
    assert_eq!(actual.len(), expected.len(), "{context}");
    for (a, e) in actual.iter().zip(expected) {
        assert_eq!(a.tensor_meta(), e.tensor_meta(), "{context}");
        assert!(a.allclose(e, 1e-6, 1e-6), "{context}: {a:?} vs {e:?}");
    }
}

#[test]
fn backend_registers_under_its_name() -> Result<()> {
    register_reference_backend();
    assert!(has_fusion_backend(BACKEND_NAME));
    let registry = registry_with_backend()?;
    let report = registry.capability_report();
    assert_eq!(report.backend.as_deref(), Some(BACKEND_NAME));
    assert!(report.is_complete());
    assert_eq!(report.checked.len(), registry.catalog().len());
    Ok(())
}

#[test]
fn fused_execution_matches_eager_for_every_operation() -> Result<()> {
    let registry = registry_with_backend()?;
    let mut rng = StdRng::seed_from_u64(2024);

    for &op in registry.catalog().ops() {
        let handle = registry.op(op.name())?;
        let inputs = common::sample_inputs(op, &mut rng);
        let eager = handle
            .call(common::call_args(op, inputs.clone()))?
            .into_vec();
        let fused = registry.fuse(&inputs, |fd, symbols| {
            Ok(handle
                .lower(fd, common::call_args(op, symbols.to_vec()))?
                .into_vec())
        })?;
        assert_all_close(&fused, &eager, op.name());
    }
    Ok(())
}

#[test]
fn keepdim_is_rebuilt_around_the_var_mean_lowering() -> Result<()> {
    let registry = registry_with_backend()?;
    let var_mean = registry.op("var_mean")?;
    let broadcast = registry.op("broadcast_in_dim")?;
    let x = Tensor::from_f32([4, 5], (0..20).map(|v| v as f32).collect())?;

    let eager = var_mean
        .call(
            CallArgs::new()
                .arg(&x)
                .kwarg("dim", vec![1i64])
                .kwarg("keepdim", true)
                .kwarg("correction", 1i64),
        )?
        .into_vec();

    let fused = registry.fuse(std::slice::from_ref(&x), |fd, symbols| {
        let (var, mean) = var_mean
            .lower(
                fd,
                CallArgs::new()
                    .arg(&symbols[0])
                    .kwarg("dim", vec![1i64])
                    .kwarg("keepdim", true)
                    .kwarg("correction", 1i64),
            )?
            .into_pair("var_mean")?;
        [var, mean]
            .into_iter()
            .map(|value| {
                broadcast
                    .lower(
                        &mut *fd,
                        CallArgs::new()
                            .arg(value)
                            .arg(vec![4i64, 1])
                            .arg(vec![0i64]),
                    )?
                    .into_single("broadcast_in_dim")
            })
            .collect()
    })?;
    assert_all_close(&fused, &eager, "var_mean keepdim");
    Ok(())
}

#[test]
fn chained_program_matches_eager_composition() -> Result<()> {
    let registry = registry_with_backend()?;
    let mut rng = StdRng::seed_from_u64(5);
    let a = common::random_tensor(&mut rng, &[3, 4], DType::F64);
    let b = common::random_tensor(&mut rng, &[3, 4], DType::F64);

    let mul = registry.op("mul")?;
    let exp = registry.op("exp")?;
    let amax = registry.op("amax")?;

    let product = mul.call(CallArgs::new().arg(&a).arg(&b))?.into_single("mul")?;
    let exped = exp.call(CallArgs::new().arg(&product))?.into_single("exp")?;
    let eager = amax
        .call(CallArgs::new().arg(&exped).arg(vec![0i64]))?
        .into_single("amax")?;

    let fused = registry.fuse(&[a, b], |fd, symbols| {
        let product = mul
            .lower(fd, CallArgs::new().arg(&symbols[0]).arg(&symbols[1]))?
            .into_single("mul")?;
        let exped = exp
            .lower(fd, CallArgs::new().arg(product))?
            .into_single("exp")?;
        Ok(amax
            .lower(fd, CallArgs::new().arg(exped).arg(vec![0i64]))?
            .into_vec())
    })?;
    assert_all_close(&fused, &[eager], "mul -> exp -> amax");
    Ok(())
}

#[test]
fn interpreter_honours_keep_dims_and_output_dtype() -> Result<()> {
    let backend = ReferenceFusionBackend::new();
    let x = Tensor::from_f32([2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;

    let mut fd = FusionDefinition::new();
    let input = fd.define_tensor(x.tensor_meta().clone());
    let summed = fd.sum(&input, &[1], true, fuseprims::fusion::FusionDType::Double)?;
    let (var, mean) = fd.var_mean(&input, &[0], 0, true)?;
    fd.add_output(&summed)?;
    fd.add_output(&var)?;
    fd.add_output(&mean)?;

    let outputs = backend.execute(&fd, &[x])?;
    assert_eq!(outputs[0].tensor_meta(), &TensorMeta::new(DType::F64, [2, 1]));
    assert_eq!(outputs[0].to_vec(), Some(vec![6.0, 15.0]));
    assert_eq!(outputs[1].tensor_meta(), &TensorMeta::new(DType::F32, [1, 3]));
    assert_eq!(outputs[1].to_vec(), Some(vec![2.25, 2.25, 2.25]));
    assert_eq!(outputs[2].to_vec(), Some(vec![2.5, 3.5, 4.5]));
    Ok(())
}

#[test]
fn interpreter_validates_inputs_against_the_definition() -> Result<()> {
    let backend = ReferenceFusionBackend::new();
    let mut fd = FusionDefinition::new();
    let input = fd.define_tensor(TensorMeta::new(DType::F32, [2]));
    let out = fd.unary(fuseprims::fusion::UnaryOp::Neg, &input)?;
    fd.add_output(&out)?;

    let err = backend
        .execute(&fd, &[])
        .expect_err("missing input must be rejected");
    assert!(matches!(err, PrimError::Fusion(_)), "{err}");

    let wrong = Tensor::zeros([3], DType::F32);
    let err = backend
        .execute(&fd, &[wrong])
        .expect_err("mismatched input must be rejected");
    assert!(matches!(err, PrimError::Fusion(_)), "{err}");

    let restored = FusionDefinition::from_json(&fd.to_json()?)?;
    let outputs = backend.execute(&restored, &[Tensor::full([2], DType::F32, 1.5)])?;
    assert_eq!(outputs[0].to_vec(), Some(vec![-1.5, -1.5]));
    Ok(())
}

#[test]
fn meta_inputs_cannot_be_executed() -> Result<()> {
    let registry = registry_with_backend()?;
    let abs = registry.op("abs")?;
    let x = Tensor::meta(DType::F32, [2]);
    let err = registry
        .fuse(&[x], |fd, symbols| {
            Ok(abs.lower(fd, CallArgs::new().arg(&symbols[0]))?.into_vec())
        })
        .expect_err("meta tensors carry no data");
    assert!(matches!(err, PrimError::MetaTensor { .. }), "{err}");
    Ok(())
}
