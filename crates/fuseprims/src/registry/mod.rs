//! The operation registry and its build lifecycle.
//!
//! A [`Registry`] is built once through
//! `build_catalog -> build_lowering_table -> run_capability_checks -> register_all` and is
//! read-only afterwards. Handles are shared as `Arc<OpHandle>`; nothing exposes a mutator.
//!
//! ```ignore
//! use fuseprims::prims::schema::CallArgs;
//! use fuseprims::{DType, Registry, Tensor};
//!
//! let registry = Registry::new()?;
//! let x = Tensor::from_f32([4, 5], (0..20).map(|v| v as f32).collect())?;
//! let (var, mean) = registry
//!     .op("var_mean")?
//!     .call(CallArgs::new().arg(&x).kwarg("dim", [1]).kwarg("correction", 1))?
//!     .into_pair("var_mean")?;
//! ```

pub mod capability;
pub mod catalog;
mod driver;
pub mod handle;
pub mod keepdim;
pub mod lowering;
pub mod mode;
pub mod var_mean;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::{ConfigError, PrimError, PrimResult, RegistryError};
use crate::fusion::backend::{create_fusion_backend, FusionBackend};
use crate::fusion::{FusionBuilder, FusionDefinition, FusionTensor};
use crate::prims::PrimTable;
use crate::tensor::Tensor;

pub use capability::{run_capability_checks, CapabilityReport};
pub use catalog::{Catalog, CatalogOp, ReductionOp, ShapeClass, ShapeOp, CATALOG_VERSION};
pub use driver::register_all;
pub use handle::{OpHandle, Overload, RealizationKind};
pub use lowering::{LoweringEntry, LoweringFn, LoweringTable};
pub use mode::{HandleMap, LoweringMode};

/// Built registry: catalog, lowering table, capability report and one handle per operation.
pub struct Registry {
    config: RegistryConfig,
    catalog: Catalog,
    lowering: LoweringTable,
    capabilities: CapabilityReport,
    backend: Option<Arc<dyn FusionBackend>>,
    handles: Vec<Arc<OpHandle>>,
    by_name: Arc<HandleMap>,
}

impl Registry {
    /// Builds the standard registry with default configuration.
    pub fn new() -> Result<Self, RegistryError> {
        Self::builder(RegistryConfig::default()).build()
    }

    /// Builds the standard registry configured from `FUSEPRIMS_*` environment variables.
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::builder(RegistryConfig::from_env()?).build()
    }

    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn get(&self, name: &str) -> Option<&Arc<OpHandle>> {
        self.by_name.get(name)
    }

    /// Like [`Registry::get`], failing with a call-time error for unknown names.
    pub fn op(&self, name: &str) -> PrimResult<&Arc<OpHandle>> {
        self.get(name).ok_or_else(|| {
            PrimError::invalid_argument(
                self.namespace(),
                format!("no operation named `{name}` is registered"),
            )
        })
    }

    /// Handles in catalog order.
    pub fn handles(&self) -> &[Arc<OpHandle>] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn lowering_table(&self) -> &LoweringTable {
        &self.lowering
    }

    pub fn capability_report(&self) -> &CapabilityReport {
        &self.capabilities
    }

    pub fn fusion_backend(&self) -> Option<&Arc<dyn FusionBackend>> {
        self.backend.as_ref()
    }

    /// Enters this registry's lowering mode: until the guard drops, donor primitive calls on this
    /// thread run through the handles registered here.
    pub fn lowering_mode(&self) -> LoweringMode {
        LoweringMode::enter(self.namespace(), Arc::clone(&self.by_name))
    }

    /// Records a fusion definition over `inputs`, then executes it on the configured backend.
    ///
    /// `build` receives the definition and one symbolic input per host tensor and returns the
    /// values to output, typically by calling [`OpHandle::lower`].
    pub fn fuse<F>(&self, inputs: &[Tensor], build: F) -> PrimResult<Vec<Tensor>>
    where
        F: FnOnce(&mut FusionDefinition, &[FusionTensor]) -> PrimResult<Vec<FusionTensor>>,
    {
        let backend = self.backend.as_ref().ok_or(PrimError::FusionUnavailable)?;
        let mut definition = FusionDefinition::new();
        let symbols = inputs
            .iter()
            .map(|input| definition.define_tensor(input.tensor_meta().clone()))
            .collect::<Vec<_>>();
        let outputs = build(&mut definition, &symbols)?;
        for output in &outputs {
            definition.add_output(output)?;
        }
        backend.execute(&definition, inputs)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespace", &self.config.namespace)
            .field("catalog", &self.catalog.version())
            .field("handles", &self.handles.len())
            .field(
                "backend",
                &self.backend.as_ref().map(|backend| backend.backend_name()),
            )
            .finish()
    }
}

/// Overrides for the inputs of the build lifecycle. Defaults are the standard catalog, its
/// standard lowering table and the standard donor primitive set.
pub struct RegistryBuilder {
    config: RegistryConfig,
    prims: Option<PrimTable>,
    catalog: Option<Catalog>,
    lowering: Option<LoweringTable>,
    backend: Option<Arc<dyn FusionBackend>>,
}

impl RegistryBuilder {
    fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            prims: None,
            catalog: None,
            lowering: None,
            backend: None,
        }
    }

    pub fn with_prims(mut self, prims: PrimTable) -> Self {
        self.prims = Some(prims);
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_lowering_table(mut self, table: LoweringTable) -> Self {
        self.lowering = Some(table);
        self
    }

    /// Uses `backend` instead of resolving one by name.
    pub fn with_fusion_backend(mut self, backend: Arc<dyn FusionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let config = self.config;
        config.validate()?;

        let catalog = self.catalog.unwrap_or_else(Catalog::standard);
        let lowering = self
            .lowering
            .unwrap_or_else(|| LoweringTable::for_catalog(&catalog));

        let backend = if config.disable_fusion {
            None
        } else {
            self.backend.or_else(|| resolve_backend(&config))
        };
        let capabilities = run_capability_checks(&lowering, backend.as_deref())?;

        let prims = self.prims.unwrap_or_else(PrimTable::standard);
        if prims.namespace() != config.donor_namespace {
            return Err(ConfigError::InvalidValue {
                key: "donor_namespace",
                value: prims.namespace().to_string(),
            }
            .into());
        }

        let handles = register_all(&config.namespace, &catalog, &lowering, &prims)?;
        let by_name = Arc::new(
            handles
                .iter()
                .map(|handle| (handle.name().to_string(), Arc::clone(handle)))
                .collect(),
        );

        info!(
            namespace = %config.namespace,
            catalog = catalog.version(),
            handles = handles.len(),
            backend = capabilities.backend.as_deref().unwrap_or("none"),
            "operation registry built"
        );

        Ok(Registry {
            config,
            catalog,
            lowering,
            capabilities,
            backend,
            handles,
            by_name,
        })
    }
}

fn resolve_backend(config: &RegistryConfig) -> Option<Arc<dyn FusionBackend>> {
    let name = config.fusion_backend.as_deref()?;
    let backend = create_fusion_backend(name);
    if backend.is_none() {
        warn!(
            backend = name,
            "configured fusion backend is not registered; lowerings cannot be executed"
        );
    }
    backend
}
