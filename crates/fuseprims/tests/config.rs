use anyhow::Result;
use fuseprims::config::DEFAULT_NAMESPACE;
use fuseprims::{ConfigError, Registry, RegistryConfig, RegistryError};

#[test]
fn defaults_target_the_standard_namespaces() {
    let config = RegistryConfig::default();
    assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    assert_eq!(config.donor_namespace, "prims");
    assert_eq!(config.fusion_backend, None);
    assert!(!config.disable_fusion);
    assert!(config.validate().is_ok());
}

#[test]
fn json_overrides_only_the_given_fields() -> Result<()> {
    let config = RegistryConfig::from_json_str(
        r#"{ "namespace": "nvprims", "fusion_backend": "reference" }"#,
    )?;
    assert_eq!(config.namespace, "nvprims");
    assert_eq!(config.donor_namespace, "prims");
    assert_eq!(config.fusion_backend.as_deref(), Some("reference"));
    assert!(!config.disable_fusion);

    let empty = RegistryConfig::from_json_str("{}")?;
    assert_eq!(empty, RegistryConfig::default());
    Ok(())
}

#[test]
fn json_rejects_unknown_fields_and_bad_namespaces() {
    assert!(matches!(
        RegistryConfig::from_json_str(r#"{ "namespaces": "x" }"#),
        Err(ConfigError::Json(_))
    ));
    assert!(matches!(
        RegistryConfig::from_json_str(r#"{ "disable_fusion": "yes" }"#),
        Err(ConfigError::Json(_))
    ));
    for namespace in ["", "9lives", "has space", "a::b"] {
        let json = serde_json::json!({ "namespace": namespace }).to_string();
        match RegistryConfig::from_json_str(&json) {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "namespace");
                assert_eq!(value, namespace);
            }
            other => panic!("{namespace:?} accepted: {other:?}"),
        }
    }
}

#[test]
fn invalid_namespace_aborts_registry_build() {
    let err = Registry::builder(RegistryConfig::default().with_namespace("not valid"))
        .build()
        .expect_err("namespace must be an identifier");
    assert!(
        matches!(
            err,
            RegistryError::Config(ConfigError::InvalidValue { key: "namespace", .. })
        ),
        "{err}"
    );
}

#[test]
fn serialises_back_to_the_same_config() -> Result<()> {
    let config = RegistryConfig::default()
        .with_namespace("_scratch")
        .with_fusion_backend("reference")
        .without_fusion();
    let json = serde_json::to_string(&config)?;
    assert_eq!(RegistryConfig::from_json_str(&json)?, config);
    Ok(())
}

// Every environment mutation in this binary lives in this one test so parallel tests never
// observe a half-applied environment.
#[test]
fn environment_overrides_defaults() -> Result<()> {
    const VARS: [&str; 3] = [
        "FUSEPRIMS_NAMESPACE",
        "FUSEPRIMS_FUSION_BACKEND",
        "FUSEPRIMS_DISABLE_FUSION",
    ];
    for var in VARS {
        std::env::remove_var(var);
    }
    assert_eq!(RegistryConfig::from_env()?, RegistryConfig::default());

    std::env::set_var("FUSEPRIMS_NAMESPACE", " nvprims ");
    std::env::set_var("FUSEPRIMS_FUSION_BACKEND", "reference");
    std::env::set_var("FUSEPRIMS_DISABLE_FUSION", "On");
    let config = RegistryConfig::from_env()?;
    assert_eq!(config.namespace, "nvprims");
    assert_eq!(config.fusion_backend.as_deref(), Some("reference"));
    assert!(config.disable_fusion);

    let registry = Registry::from_env()?;
    assert_eq!(registry.namespace(), "nvprims");
    assert!(registry.fusion_backend().is_none());

    std::env::set_var("FUSEPRIMS_DISABLE_FUSION", "0");
    std::env::set_var("FUSEPRIMS_FUSION_BACKEND", "   ");
    let config = RegistryConfig::from_env()?;
    assert!(!config.disable_fusion);
    assert_eq!(config.fusion_backend, None);

    std::env::set_var("FUSEPRIMS_NAMESPACE", "bad-name");
    assert!(matches!(
        RegistryConfig::from_env(),
        Err(ConfigError::InvalidValue { key: "namespace", .. })
    ));

    for var in VARS {
        std::env::remove_var(var);
    }
    Ok(())
}
