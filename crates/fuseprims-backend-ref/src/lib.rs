pub mod interpreter;

use std::sync::Arc;

use fuseprims::fusion::backend::{register_fusion_backend, FusionBackend};

pub use interpreter::ReferenceFusionBackend;

/// Name the backend registers under.
pub const BACKEND_NAME: &str = "reference";

/// Register the reference fusion backend with the global fusion-backend registry.
///
/// This function is called automatically via a static initializer, but can also
/// be called manually to ensure the backend is registered.
pub fn register_reference_backend() {
    register_fusion_backend(BACKEND_NAME, || -> Arc<dyn FusionBackend> {
        Arc::new(ReferenceFusionBackend::new())
    });
}

// Auto-register on library load
#[cfg(any(target_os = "linux", target_os = "android"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_REFERENCE_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_reference_backend();
    }
    register
};
