//! Three-tier field path resolution: override → standard → derived.

use crate::parameters::SearchParameterType;
use crate::registry::SearchPathRegistry;

/// Resolves the ordered candidate document paths for a search parameter.
///
/// 1. A resource-specific override wins outright.
/// 2. Otherwise the type-keyed standard table is consulted.
/// 3. Otherwise a path is derived by convention:
///    - Token/String/Number/Quantity → `[name]`
///    - Date → `[name, name + "DateTime"]`
///    - Reference → `[name + ".reference"]`
///
/// Derivation always produces at least one path, so an empty result never
/// signals "no mapping"; unusable parameters are surfaced when predicate
/// building fails instead.
#[must_use]
pub fn resolve(
    registry: &SearchPathRegistry,
    resource_type: &str,
    param: &str,
    param_type: SearchParameterType,
) -> Vec<String> {
    if let Some(paths) = registry.override_paths(resource_type, param) {
        return paths;
    }

    if let Some(paths) = registry.standard_paths(param_type, param) {
        return paths;
    }

    derive_paths(param, param_type)
}

/// Pure-convention fallback paths for a parameter with no table entry.
fn derive_paths(param: &str, param_type: SearchParameterType) -> Vec<String> {
    match param_type {
        SearchParameterType::Token
        | SearchParameterType::String
        | SearchParameterType::Number
        | SearchParameterType::Quantity => vec![param.to_string()],
        SearchParameterType::Date => vec![param.to_string(), format!("{param}DateTime")],
        SearchParameterType::Reference => vec![format!("{param}.reference")],
    }
}
