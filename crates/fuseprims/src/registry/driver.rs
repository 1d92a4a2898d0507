//! Registration Driver: binds one handle per catalog operation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::autograd::backwards_not_supported;
use crate::error::RegistryError;
use crate::prims::{PrimDef, PrimTable};

use super::catalog::{Catalog, CatalogOp, ShapeOp};
use super::handle::{OpHandle, Overload};
use super::lowering::{LoweringEntry, LoweringTable};
use super::var_mean::{build_var_mean, VarMeanDeps};

/// Catalog and lowering table must cover the same names, each exactly once.
fn check_coverage(catalog: &Catalog, table: &LoweringTable) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for name in catalog.names() {
        if !seen.insert(name) {
            return Err(RegistryError::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        if table.get(name).is_none() {
            return Err(RegistryError::MissingLowering {
                name: name.to_string(),
            });
        }
    }
    if let Some(orphan) = table.names().find(|name| !catalog.contains(name)) {
        return Err(RegistryError::OrphanLowering {
            name: orphan.to_string(),
        });
    }
    Ok(())
}

fn lowering_entry<'a>(
    table: &'a LoweringTable,
    name: &str,
) -> Result<&'a LoweringEntry, RegistryError> {
    table.get(name).ok_or_else(|| RegistryError::MissingLowering {
        name: name.to_string(),
    })
}

/// Re-declares a donor primitive under `namespace` with an identical schema.
fn register_delegated(
    namespace: &str,
    name: &str,
    entry: &LoweringEntry,
    prims: &PrimTable,
) -> Result<OpHandle, RegistryError> {
    let donor = prims
        .lookup(name)
        .ok_or_else(|| RegistryError::MissingPrimitive {
            namespace: prims.namespace().to_string(),
            name: name.to_string(),
        })?;
    let qualified = format!("{namespace}::{name}");
    let overload = Overload::new(
        "default",
        donor.schema.clone(),
        donor.meta.clone(),
        donor.reference.clone(),
        backwards_not_supported(qualified, donor.reference.clone()),
        entry.lower.clone(),
    );
    Ok(OpHandle::new(
        namespace,
        name,
        donor.doc.clone(),
        donor.return_type,
        entry.lower.clone(),
        vec![overload],
        Some(donor),
    ))
}

fn dependency<'a>(
    handles: &'a [Arc<OpHandle>],
    name: &str,
    dependency: &str,
) -> Result<&'a Arc<OpHandle>, RegistryError> {
    handles
        .iter()
        .find(|handle| handle.name() == dependency)
        .ok_or_else(|| RegistryError::MissingDependency {
            name: name.to_string(),
            dependency: dependency.to_string(),
        })
}

/// Registers every catalog operation under `namespace`.
///
/// Ordinary operations are registered in catalog order by delegation to `prims`; composite
/// operations are registered afterwards since they call into ordinary handles. Any gap between
/// catalog, lowering table and donor set fails here rather than at first call.
pub fn register_all(
    namespace: &str,
    catalog: &Catalog,
    table: &LoweringTable,
    prims: &PrimTable,
) -> Result<Vec<Arc<OpHandle>>, RegistryError> {
    check_coverage(catalog, table)?;

    let mut handles: Vec<Arc<OpHandle>> = Vec::with_capacity(catalog.len());
    for op in catalog.ops().iter().filter(|op| !op.is_composite()) {
        let entry = lowering_entry(table, op.name())?;
        let handle = register_delegated(namespace, op.name(), entry, prims)?;
        debug!(
            op = %handle.qualified_name(),
            class = ?op.shape_class(),
            backend_ops = ?entry.backend_ops,
            "registered operation"
        );
        handles.push(Arc::new(handle));
    }

    let mut composites = Vec::new();
    for op in catalog.ops().iter().filter(|op| op.is_composite()) {
        let entry = lowering_entry(table, op.name())?;
        let handle = register_composite(namespace, *op, entry, &handles, prims)?;
        debug!(
            op = %handle.qualified_name(),
            overloads = handle.overloads().len(),
            backend_ops = ?entry.backend_ops,
            "registered composite operation"
        );
        composites.push(Arc::new(handle));
    }
    handles.extend(composites);

    // Restore catalog order.
    handles.sort_by_key(|handle| {
        catalog
            .ops()
            .iter()
            .position(|op| op.name() == handle.name())
    });
    Ok(handles)
}

fn donor_of(handle: &OpHandle, prims: &PrimTable) -> Result<Arc<PrimDef>, RegistryError> {
    handle
        .donor()
        .cloned()
        .ok_or_else(|| RegistryError::MissingPrimitive {
            namespace: prims.namespace().to_string(),
            name: handle.name().to_string(),
        })
}

fn register_composite(
    namespace: &str,
    op: CatalogOp,
    entry: &LoweringEntry,
    handles: &[Arc<OpHandle>],
    prims: &PrimTable,
) -> Result<OpHandle, RegistryError> {
    let name = op.name();
    let broadcast = dependency(handles, name, ShapeOp::BroadcastInDim.name())?;
    let convert = dependency(handles, name, ShapeOp::ConvertElementType.name())?;
    let deps = VarMeanDeps {
        namespace: namespace.to_string(),
        handles: Arc::new(
            handles
                .iter()
                .map(|handle| (handle.name().to_string(), Arc::clone(handle)))
                .collect(),
        ),
        broadcast_in_dim: donor_of(broadcast, prims)?,
        convert_element_type: donor_of(convert, prims)?,
    };
    Ok(build_var_mean(entry, deps))
}
