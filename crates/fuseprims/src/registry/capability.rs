//! Capability Checker: verifies the fusion backend exposes every operator the lowering table
//! emits.

use serde::Serialize;
use tracing::debug;

use crate::error::RegistryError;
use crate::fusion::backend::FusionBackend;

use super::lowering::LoweringTable;

/// Outcome of checking one backend against a lowering table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    /// `None` when no fusion backend is available.
    pub backend: Option<String>,
    /// Lowering entries that were checked.
    pub checked: Vec<String>,
    /// Operators the backend lacks, as `entry:operator`.
    pub missing: Vec<String>,
}

impl CapabilityReport {
    pub fn backend_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Checks every lowering entry's backend operators against `backend`.
///
/// A missing backend yields an empty report. A backend lacking any operator is a catalog/backend
/// version skew and fails with [`RegistryError::CapabilityMismatch`].
pub fn run_capability_checks(
    table: &LoweringTable,
    backend: Option<&dyn FusionBackend>,
) -> Result<CapabilityReport, RegistryError> {
    let Some(backend) = backend else {
        debug!("no fusion backend available; skipping capability checks");
        return Ok(CapabilityReport::default());
    };

    let mut report = CapabilityReport {
        backend: Some(backend.backend_name().to_string()),
        ..CapabilityReport::default()
    };
    for entry in table.entries() {
        for operator in &entry.backend_ops {
            let present = backend.has_operator(operator);
            debug!(
                backend = backend.backend_name(),
                entry = %entry.name,
                operator,
                present,
                "capability check"
            );
            if !present {
                report.missing.push(format!("{}:{}", entry.name, operator));
            }
        }
        report.checked.push(entry.name.clone());
    }

    if !report.is_complete() {
        return Err(RegistryError::CapabilityMismatch {
            backend: backend.backend_name().to_string(),
            missing: report.missing,
        });
    }
    Ok(report)
}
