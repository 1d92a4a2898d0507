//! Fused-kernel backends and the global name-keyed registry backend crates plug into.
//!
//! Backends register a constructor under a name (usually from a module initializer) and the
//! registry resolves that name from configuration at build time. An unregistered name is an
//! expected deployment configuration, not an error.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::FusionDefinition;
use crate::error::PrimResult;
use crate::tensor::Tensor;

/// Executes recorded fusion definitions and advertises the operators it can run.
pub trait FusionBackend: Send + Sync {
    /// Returns a human-readable backend identifier (e.g. "reference").
    fn backend_name(&self) -> &str;

    /// Operator names this backend exposes.
    fn operators(&self) -> Vec<&'static str>;

    fn has_operator(&self, name: &str) -> bool {
        self.operators().iter().any(|operator| *operator == name)
    }

    /// Runs `definition` on host inputs, returning one tensor per declared output.
    fn execute(&self, definition: &FusionDefinition, inputs: &[Tensor]) -> PrimResult<Vec<Tensor>>;
}

/// Factory function that creates a new backend instance.
pub type FusionBackendConstructor = Box<dyn Fn() -> Arc<dyn FusionBackend> + Send + Sync>;

struct FusionBackendRegistry {
    backends: RwLock<HashMap<String, FusionBackendConstructor>>,
}

impl FusionBackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: FusionBackendConstructor) {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Arc<dyn FusionBackend>> {
        let registry = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list(&self) -> Vec<String> {
        let mut names = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn contains(&self, name: &str) -> bool {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<FusionBackendRegistry> = OnceLock::new();

fn global_registry() -> &'static FusionBackendRegistry {
    GLOBAL_REGISTRY.get_or_init(FusionBackendRegistry::new)
}

/// Registers a fusion backend constructor under `name`, replacing any previous registration.
///
/// # Example
/// ```ignore
/// use fuseprims::fusion::backend::register_fusion_backend;
///
/// pub fn register() {
///     register_fusion_backend("my_backend", || Arc::new(MyBackend::new()));
/// }
/// ```
pub fn register_fusion_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Arc<dyn FusionBackend> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Creates a backend instance by name, or `None` if nothing is registered under it.
pub fn create_fusion_backend(name: &str) -> Option<Arc<dyn FusionBackend>> {
    global_registry().create(name)
}

/// Registered backend names, sorted.
pub fn list_fusion_backends() -> Vec<String> {
    global_registry().list()
}

pub fn has_fusion_backend(name: &str) -> bool {
    global_registry().contains(name)
}
