mod common;

use anyhow::Result;
use fuseprims::registry::RealizationKind;
use fuseprims::{CallArgs, DType, Registry, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn values(tensor: &Tensor) -> Vec<f64> {
    tensor.to_vec().expect("eager tensor has storage")
}

fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "element {index}: {a} vs {e}");
    }
}

fn arange(shape: [usize; 2]) -> Result<Tensor> {
    let numel = shape[0] * shape[1];
    Ok(Tensor::from_f32(shape, (0..numel).map(|v| v as f32).collect())?)
}

#[test]
fn row_variance_with_sample_correction() -> Result<()> {
    let registry = Registry::new()?;
    let x = arange([4, 5])?;
    let (var, mean) = registry
        .op("var_mean")?
        .call(CallArgs::new().arg(&x).kwarg("dim", vec![1i64]).kwarg("correction", 1i64))?
        .into_pair("var_mean")?;

    assert_eq!(var.shape().dims(), &[4]);
    assert_eq!(mean.shape().dims(), &[4]);
    assert_eq!(var.dtype(), DType::F32);
    assert_eq!(mean.dtype(), DType::F32);
    assert_close(&values(&var), &[2.5; 4], 1e-6);
    assert_close(&values(&mean), &[2.0, 7.0, 12.0, 17.0], 1e-6);
    Ok(())
}

#[test]
fn keepdim_restores_reduced_axes_as_unit_axes() -> Result<()> {
    let registry = Registry::new()?;
    let var_mean = registry.op("var_mean")?;
    let x = arange([4, 5])?;

    let (var, mean) = var_mean
        .call(
            CallArgs::new()
                .arg(&x)
                .kwarg("dim", vec![1i64])
                .kwarg("keepdim", true)
                .kwarg("correction", 1i64),
        )?
        .into_pair("var_mean")?;
    assert_eq!(var.shape().dims(), &[4, 1]);
    assert_eq!(mean.shape().dims(), &[4, 1]);
    assert_close(&values(&mean), &[2.0, 7.0, 12.0, 17.0], 1e-6);

    let mut rng = StdRng::seed_from_u64(7);
    let cube = common::random_tensor(&mut rng, &[2, 3, 4], DType::F64);
    let cases: [(Option<Vec<i64>>, &[usize]); 4] = [
        (Some(vec![1]), &[2, 1, 4]),
        (Some(vec![0, 2]), &[1, 3, 1]),
        (Some(vec![-1]), &[2, 3, 1]),
        (None, &[1, 1, 1]),
    ];
    for (dim, expected) in cases {
        for input in [cube.clone(), cube.to_meta()] {
            let (var, mean) = var_mean
                .call(
                    CallArgs::new()
                        .arg(&input)
                        .kwarg("dim", dim.clone())
                        .kwarg("keepdim", true),
                )?
                .into_pair("var_mean")?;
            assert_eq!(var.shape().dims(), expected, "dim {dim:?}");
            assert_eq!(mean.shape().dims(), expected, "dim {dim:?}");
            assert_eq!(var.is_meta(), input.is_meta());
        }
    }
    Ok(())
}

#[test]
fn matches_separate_variance_and_mean() -> Result<()> {
    let registry = Registry::new()?;
    let mut rng = StdRng::seed_from_u64(42);
    let x = common::random_tensor(&mut rng, &[3, 4, 5], DType::F64);

    for correction in [0i64, 1, 2] {
        let (var, mean) = registry
            .op("var_mean")?
            .call(
                CallArgs::new()
                    .arg(&x)
                    .kwarg("dim", vec![0i64, 2])
                    .kwarg("correction", correction),
            )?
            .into_pair("var_mean")?;

        let expected_var = registry
            .op("var")?
            .call(
                CallArgs::new()
                    .arg(&x)
                    .arg(vec![0i64, 2])
                    .kwarg("correction", correction),
            )?
            .into_single("var")?;
        let sum = registry
            .op("sum")?
            .call(CallArgs::new().arg(&x).arg(vec![0i64, 2]))?
            .into_single("sum")?;
        let expected_mean = values(&sum).iter().map(|s| s / 15.0).collect::<Vec<_>>();

        assert_eq!(var.tensor_meta(), expected_var.tensor_meta());
        assert_close(&values(&var), &values(&expected_var), 1e-12);
        assert_close(&values(&mean), &expected_mean, 1e-12);
    }
    Ok(())
}

#[test]
fn unbiased_and_correction_conflict_everywhere() -> Result<()> {
    let registry = Registry::new()?;
    let var_mean = registry.op("var_mean")?;
    let x = arange([4, 5])?;

    for input in [x.clone(), x.to_meta()] {
        for dim in [None, Some(vec![1i64])] {
            for keepdim in [false, true] {
                for unbiased in [false, true] {
                    for correction in [0i64, 1] {
                        let err = var_mean
                            .call(
                                CallArgs::new()
                                    .arg(&input)
                                    .kwarg("dim", dim.clone())
                                    .kwarg("unbiased", unbiased)
                                    .kwarg("keepdim", keepdim)
                                    .kwarg("correction", correction),
                            )
                            .expect_err("conflicting correction must be rejected");
                        assert!(err.is_invalid_argument(), "{err}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[test]
fn complex_inputs_are_not_implemented() -> Result<()> {
    let registry = Registry::new()?;
    let var_mean = registry.op("var_mean")?;
    let mut rng = StdRng::seed_from_u64(3);

    for dtype in [DType::C64, DType::C128] {
        let z = common::random_tensor(&mut rng, &[2, 3], dtype);
        for input in [z.clone(), z.to_meta()] {
            let err = var_mean
                .call(CallArgs::new().arg(&input).kwarg("dim", vec![1i64]))
                .expect_err("complex var_mean must be rejected");
            assert!(err.is_not_implemented(), "{err}");

            let err = var_mean
                .call(CallArgs::new().arg(&input).arg(true))
                .expect_err("complex var_mean must be rejected");
            assert!(err.is_not_implemented(), "{err}");
        }
    }
    Ok(())
}

#[test]
fn meta_inputs_follow_eager_promotion() -> Result<()> {
    let registry = Registry::new()?;
    let var_mean = registry.op("var_mean")?;
    let values = (0..20i32).map(f64::from).collect::<Vec<_>>();
    let cases = [
        (Tensor::from_vec([4, 5], DType::I32, values.clone())?, DType::F32),
        (Tensor::from_vec([4, 5], DType::F16, values)?, DType::F16),
    ];

    for (x, expected) in cases {
        let calls = |input: &Tensor| {
            [
                CallArgs::new().arg(input).kwarg("dim", vec![1i64]),
                CallArgs::new()
                    .arg(input)
                    .kwarg("dim", vec![1i64])
                    .kwarg("keepdim", true)
                    .kwarg("correction", 0i64),
                CallArgs::new().arg(input).arg(true),
            ]
        };
        for (eager_args, meta_args) in calls(&x).into_iter().zip(calls(&x.to_meta())) {
            let eager = var_mean.call(eager_args)?.into_vec();
            let meta = var_mean.call(meta_args)?.into_vec();
            assert_eq!(eager.len(), meta.len());
            for (e, m) in eager.iter().zip(&meta) {
                assert!(m.is_meta());
                assert_eq!(e.dtype(), expected);
                assert_eq!(e.tensor_meta(), m.tensor_meta(), "{:?}", x.dtype());
            }
        }
    }
    Ok(())
}

#[test]
fn integer_inputs_compute_in_default_float() -> Result<()> {
    let registry = Registry::new()?;
    let x = Tensor::from_vec([2, 3], DType::I32, vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0])?;
    let (var, mean) = registry
        .op("var_mean")?
        .call(CallArgs::new().arg(&x).kwarg("dim", 1i64).kwarg("correction", 0i64))?
        .into_pair("var_mean")?;
    assert_eq!(var.dtype(), DType::F32);
    assert_eq!(mean.dtype(), DType::F32);
    assert_close(&values(&mean), &[2.0, 6.0], 1e-6);
    assert_close(&values(&var), &[2.0 / 3.0, 8.0 / 3.0], 1e-6);
    Ok(())
}

#[test]
fn half_inputs_return_half_results() -> Result<()> {
    let registry = Registry::new()?;
    let x = Tensor::from_vec([2, 2], DType::F16, vec![1.0, 3.0, 5.0, 9.0])?;
    let (var, mean) = registry
        .op("var_mean")?
        .call(CallArgs::new().arg(&x).kwarg("dim", vec![1i64]))?
        .into_pair("var_mean")?;
    assert_eq!(var.dtype(), DType::F16);
    assert_eq!(mean.dtype(), DType::F16);
    assert_close(&values(&mean), &[2.0, 7.0], 1e-3);
    assert_close(&values(&var), &[2.0, 8.0], 1e-3);
    Ok(())
}

#[test]
fn default_overload_reduces_everything_with_unbiased_flag() -> Result<()> {
    let registry = Registry::new()?;
    let var_mean = registry.op("var_mean")?;
    let x = arange([4, 5])?;

    let (var, mean) = var_mean
        .call(CallArgs::new().arg(&x).arg(true))?
        .into_pair("var_mean")?;
    assert_eq!(var.rank(), 0);
    assert_eq!(mean.rank(), 0);
    assert_close(&values(&mean), &[9.5], 1e-6);
    // Sum of squared deviations of 0..20 is 665.
    assert_close(&values(&var), &[665.0 / 19.0], 1e-4);

    let (biased, _) = var_mean
        .call(CallArgs::new().arg(&x).arg(false))?
        .into_pair("var_mean")?;
    assert_close(&values(&biased), &[665.0 / 20.0], 1e-4);

    let (main_var, main_mean) = var_mean
        .overload("main")?
        .call(CallArgs::new().arg(&x).kwarg("unbiased", true))?
        .into_pair("var_mean")?;
    assert!(main_var.allclose(&var, 0.0, 0.0));
    assert!(main_mean.allclose(&mean, 0.0, 0.0));
    Ok(())
}

#[test]
fn omitted_correction_means_sample_variance() -> Result<()> {
    let registry = Registry::new()?;
    let x = arange([4, 5])?;
    let (var, _) = registry
        .op("var_mean")?
        .call(CallArgs::new().arg(&x).kwarg("dim", vec![1i64]))?
        .into_pair("var_mean")?;
    assert_close(&values(&var), &[2.5; 4], 1e-6);
    Ok(())
}

#[test]
fn out_of_range_dim_is_rejected() -> Result<()> {
    let registry = Registry::new()?;
    let x = arange([4, 5])?;
    let err = registry
        .op("var_mean")?
        .call(CallArgs::new().arg(&x).kwarg("dim", vec![2i64]))
        .expect_err("dim 2 is out of range for rank 2");
    assert!(err.is_invalid_argument(), "{err}");
    Ok(())
}

#[test]
fn reference_realization_skips_promotion() -> Result<()> {
    let registry = Registry::new()?;
    let main = registry.op("var_mean")?.overload("main")?;
    let x = arange([4, 5])?;
    let (var, mean) = main
        .call_realization(
            RealizationKind::Reference,
            CallArgs::new().arg(&x).kwarg("dim", vec![1i64]).kwarg("keepdim", true),
        )?
        .into_pair("var_mean")?;
    assert_eq!(var.shape().dims(), &[4, 1]);
    assert_close(&values(&mean), &[2.0, 7.0, 12.0, 17.0], 1e-6);

    let ints = Tensor::from_vec([2], DType::I32, vec![1.0, 2.0])?;
    assert!(main
        .call_realization(RealizationKind::Reference, CallArgs::new().arg(&ints))
        .is_err());
    Ok(())
}
