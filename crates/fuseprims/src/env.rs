use std::env;

pub(crate) const NAMESPACE_VAR: &str = "FUSEPRIMS_NAMESPACE";
pub(crate) const FUSION_BACKEND_VAR: &str = "FUSEPRIMS_FUSION_BACKEND";
pub(crate) const DISABLE_FUSION_VAR: &str = "FUSEPRIMS_DISABLE_FUSION";

pub(crate) fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Value of `name`, treating unset and blank as absent.
pub(crate) fn non_empty(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}
