//! Registry configuration, read from JSON or the process environment.

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::ConfigError;
use crate::prims::PRIMS_NAMESPACE;

pub const DEFAULT_NAMESPACE: &str = "fuseprims";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Namespace registered handles live under (`fuseprims::abs`).
    pub namespace: String,
    /// Namespace the donor primitive set must declare.
    pub donor_namespace: String,
    /// Fusion backend to resolve from the global backend registry.
    pub fusion_backend: Option<String>,
    /// Skip backend resolution entirely; lowerings stay callable but `fuse` is unavailable.
    pub disable_fusion: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            donor_namespace: PRIMS_NAMESPACE.to_string(),
            fusion_backend: None,
            disable_fusion: false,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `FUSEPRIMS_NAMESPACE`, `FUSEPRIMS_FUSION_BACKEND` and
    /// `FUSEPRIMS_DISABLE_FUSION`. Blank variables are ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(namespace) = env::non_empty(env::NAMESPACE_VAR) {
            config.namespace = namespace;
        }
        if let Some(backend) = env::non_empty(env::FUSION_BACKEND_VAR) {
            config.fusion_backend = Some(backend);
        }
        if let Some(disable) = env::non_empty(env::DISABLE_FUSION_VAR) {
            config.disable_fusion = env::parse_bool(&disable);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_fusion_backend(mut self, backend: impl Into<String>) -> Self {
        self.fusion_backend = Some(backend.into());
        self
    }

    pub fn without_fusion(mut self) -> Self {
        self.disable_fusion = true;
        self
    }

    /// Namespaces must be non-empty identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("namespace", &self.namespace)?;
        check_identifier("donor_namespace", &self.donor_namespace)
    }
}

fn check_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
    }
}
