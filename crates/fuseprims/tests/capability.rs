use std::sync::Arc;

use anyhow::Result;
use fuseprims::fusion::backend::{
    create_fusion_backend, has_fusion_backend, list_fusion_backends, register_fusion_backend,
    FusionBackend,
};
use fuseprims::fusion::operator_names;
use fuseprims::registry::{run_capability_checks, LoweringTable};
use fuseprims::{
    FusionDefinition, PrimError, PrimResult, Registry, RegistryConfig, RegistryError, Tensor,
};

/// Backend that advertises a fixed operator set and cannot execute anything.
struct StubBackend {
    name: &'static str,
    operators: Vec<&'static str>,
}

impl StubBackend {
    fn complete(name: &'static str) -> Self {
        Self {
            name,
            operators: operator_names(),
        }
    }

    fn without(name: &'static str, missing: &[&str]) -> Self {
        Self {
            name,
            operators: operator_names()
                .into_iter()
                .filter(|operator| !missing.contains(operator))
                .collect(),
        }
    }
}

impl FusionBackend for StubBackend {
    fn backend_name(&self) -> &str {
        self.name
    }

    fn operators(&self) -> Vec<&'static str> {
        self.operators.clone()
    }

    fn execute(
        &self,
        _definition: &FusionDefinition,
        _inputs: &[Tensor],
    ) -> PrimResult<Vec<Tensor>> {
        Err(PrimError::fusion("stub backend does not execute"))
    }
}

#[test]
fn no_backend_yields_an_empty_report() -> Result<()> {
    let report = run_capability_checks(&LoweringTable::standard(), None)?;
    assert!(!report.backend_available());
    assert!(report.checked.is_empty());
    assert!(report.is_complete());

    let registry = Registry::new()?;
    assert_eq!(registry.capability_report(), &report);
    Ok(())
}

#[test]
fn complete_backend_passes_every_check() -> Result<()> {
    let table = LoweringTable::standard();
    let backend = StubBackend::complete("stub-complete");
    let report = run_capability_checks(&table, Some(&backend as &dyn FusionBackend))?;
    assert_eq!(report.backend.as_deref(), Some("stub-complete"));
    assert_eq!(report.checked.len(), table.len());
    assert!(report.missing.is_empty());

    let registry = Registry::builder(RegistryConfig::default())
        .with_fusion_backend(Arc::new(StubBackend::complete("stub-complete")))
        .build()?;
    assert!(registry.capability_report().backend_available());
    assert_eq!(
        registry.fusion_backend().map(|backend| backend.backend_name()),
        Some("stub-complete")
    );
    Ok(())
}

#[test]
fn backend_missing_an_operator_fails_registration() {
    let err = Registry::builder(RegistryConfig::default())
        .with_fusion_backend(Arc::new(StubBackend::without("stub-skewed", &["var_mean"])))
        .build()
        .expect_err("capability mismatch must abort registration");
    match err {
        RegistryError::CapabilityMismatch { backend, missing } => {
            assert_eq!(backend, "stub-skewed");
            assert_eq!(missing, vec!["var_mean:var_mean".to_string()]);
        }
        other => panic!("expected CapabilityMismatch, got {other}"),
    }
}

#[test]
fn mismatch_lists_every_missing_operator() {
    let backend = StubBackend::without("stub-partial", &["max", "min", "cast"]);
    let err = run_capability_checks(
        &LoweringTable::standard(),
        Some(&backend as &dyn FusionBackend),
    )
    .expect_err("capability mismatch");
    let message = err.to_string();
    for expected in ["convert_element_type:cast", "amax:max", "amin:min"] {
        assert!(message.contains(expected), "{message}");
    }
}

#[test]
fn registered_backend_is_resolved_by_name() -> Result<()> {
    register_fusion_backend("stub-registered", || -> Arc<dyn FusionBackend> {
        Arc::new(StubBackend::complete("stub-registered"))
    });
    assert!(has_fusion_backend("stub-registered"));
    assert!(list_fusion_backends().contains(&"stub-registered".to_string()));
    assert!(create_fusion_backend("stub-registered").is_some());

    let registry =
        Registry::builder(RegistryConfig::default().with_fusion_backend("stub-registered"))
            .build()?;
    assert_eq!(
        registry.capability_report().backend.as_deref(),
        Some("stub-registered")
    );
    Ok(())
}

#[test]
fn unregistered_backend_name_builds_without_fusion() -> Result<()> {
    assert!(!has_fusion_backend("never-registered"));
    let registry =
        Registry::builder(RegistryConfig::default().with_fusion_backend("never-registered"))
            .build()?;
    assert!(registry.fusion_backend().is_none());
    assert!(!registry.capability_report().backend_available());
    assert_eq!(registry.len(), registry.catalog().len());
    Ok(())
}

#[test]
fn disable_fusion_overrides_an_explicit_backend() -> Result<()> {
    let registry = Registry::builder(RegistryConfig::default().without_fusion())
        .with_fusion_backend(Arc::new(StubBackend::without("stub-ignored", &["sum"])))
        .build()?;
    assert!(registry.fusion_backend().is_none());
    assert!(registry.capability_report().checked.is_empty());
    Ok(())
}

#[test]
fn execution_errors_come_from_the_backend() -> Result<()> {
    let registry = Registry::builder(RegistryConfig::default())
        .with_fusion_backend(Arc::new(StubBackend::complete("stub-exec")))
        .build()?;
    let abs = registry.op("abs")?;
    let x = Tensor::zeros([2], fuseprims::DType::F32);
    let err = registry
        .fuse(&[x], |fd, inputs| {
            Ok(abs
                .lower(fd, fuseprims::CallArgs::new().arg(&inputs[0]))?
                .into_vec())
        })
        .expect_err("stub backend refuses to execute");
    assert!(matches!(err, PrimError::Fusion(_)), "{err}");
    Ok(())
}
