//! Process-wide search registries.
//!
//! Two read-mostly registries are seeded at startup and shared by every
//! search invocation:
//!
//! - [`SearchPathRegistry`]: resource-specific override paths and
//!   type-keyed standard paths. Adding a resource is a data change here,
//!   not a code change in the resolver.
//! - [`FunctionalIndexRegistry`]: `"ResourceType.path"` keys mapped to
//!   accessor expressions backed by real expression indexes. Presence of an
//!   entry only changes which accessor computes a match, never which rows
//!   match.

use dashmap::DashMap;

use crate::parameters::SearchParameterType;

/// Override and standard path tables for search parameter resolution.
#[derive(Debug, Default)]
pub struct SearchPathRegistry {
    /// Resource-specific overrides keyed by (resource type, parameter name).
    overrides: DashMap<(String, String), Vec<String>>,
    /// Resource-agnostic paths keyed by (parameter type, parameter name).
    standard: DashMap<(SearchParameterType, String), Vec<String>>,
}

impl SearchPathRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in path tables.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        register_default_paths(&registry);
        registry
    }

    /// Registers a resource-specific override.
    ///
    /// An override always wins over a standard entry for the same name.
    pub fn register_override(
        &self,
        resource_type: impl Into<String>,
        param: impl Into<String>,
        paths: Vec<String>,
    ) {
        self.overrides
            .insert((resource_type.into(), param.into()), paths);
    }

    /// Registers a resource-agnostic standard path list.
    pub fn register_standard(
        &self,
        param_type: SearchParameterType,
        param: impl Into<String>,
        paths: Vec<String>,
    ) {
        self.standard.insert((param_type, param.into()), paths);
    }

    /// Looks up a resource-specific override.
    #[must_use]
    pub fn override_paths(&self, resource_type: &str, param: &str) -> Option<Vec<String>> {
        self.overrides
            .get(&(resource_type.to_string(), param.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Looks up a standard path list for a parameter type.
    #[must_use]
    pub fn standard_paths(&self, param_type: SearchParameterType, param: &str) -> Option<Vec<String>> {
        self.standard
            .get(&(param_type, param.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Number of registered override entries.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

/// Registry of accessor expressions backed by real expression indexes.
///
/// Keys are `"ResourceType.path"` where `path` is the *first* candidate path
/// produced by resolution. Keys never contain bracket segments: a bracketed
/// first path therefore always takes the compiler fallback, which matches
/// the same rows through a different expression.
#[derive(Debug, Default)]
pub struct FunctionalIndexRegistry {
    entries: DashMap<String, String>,
}

impl FunctionalIndexRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in index entries.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        register_default_indexes(&registry);
        registry
    }

    /// Registers an indexed accessor expression.
    pub fn register(&self, key: impl Into<String>, accessor: impl Into<String>) {
        self.entries.insert(key.into(), accessor.into());
    }

    /// Looks up the indexed accessor for a resource type and first path.
    #[must_use]
    pub fn lookup(&self, resource_type: &str, first_path: &str) -> Option<String> {
        self.entries
            .get(&format!("{resource_type}.{first_path}"))
            .map(|entry| entry.value().clone())
    }

    /// Returns `(index name, accessor expression)` pairs for one resource
    /// type, for schema management: every registry entry must be backed by
    /// a matching expression index or the fast path would be a plain scan.
    #[must_use]
    pub fn index_definitions(&self, resource_type: &str) -> Vec<(String, String)> {
        let prefix = format!("{resource_type}.");
        let mut defs: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| {
                let path = &entry.key()[prefix.len()..];
                let name = path.to_lowercase().replace('.', "_");
                (name, entry.value().clone())
            })
            .collect();
        defs.sort();
        defs
    }

    /// Number of registered index entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Seeds the built-in override and standard path tables.
pub fn register_default_paths(registry: &SearchPathRegistry) {
    let ov = |rt: &str, param: &str, paths: &[&str]| {
        registry.register_override(
            rt,
            param,
            paths.iter().map(ToString::to_string).collect(),
        );
    };

    // Patient
    ov("Patient", "name", &["name[*].family", "name[*].given"]);
    ov("Patient", "family", &["name[*].family"]);
    ov("Patient", "given", &["name[*].given"]);
    ov("Patient", "birthdate", &["birthDate"]);
    ov("Patient", "gender", &["gender"]);
    ov("Patient", "active", &["active"]);
    ov("Patient", "address-city", &["address[*].city"]);
    ov("Patient", "address-postalcode", &["address[*].postalCode"]);
    ov("Patient", "phone", &["telecom[*].value"]);
    ov("Patient", "email", &["telecom[*].value"]);
    ov(
        "Patient",
        "general-practitioner",
        &["generalPractitioner[*].reference"],
    );

    // Observation
    ov(
        "Observation",
        "date",
        &["effectiveDateTime", "effectivePeriod.start"],
    );
    ov("Observation", "code", &["code.coding[*].code"]);
    ov("Observation", "status", &["status"]);
    ov("Observation", "subject", &["subject.reference"]);
    ov("Observation", "patient", &["subject.reference"]);
    ov("Observation", "category", &["category[*].coding[0].code"]);
    ov("Observation", "value-quantity", &["valueQuantity.value"]);

    // Encounter
    ov("Encounter", "date", &["period.start"]);
    ov("Encounter", "status", &["status"]);
    ov("Encounter", "class", &["class.code"]);
    ov("Encounter", "subject", &["subject.reference"]);
    ov("Encounter", "patient", &["subject.reference"]);

    // Condition
    ov("Condition", "code", &["code.coding[*].code"]);
    ov(
        "Condition",
        "clinical-status",
        &["clinicalStatus.coding[0].code"],
    );
    ov("Condition", "onset-date", &["onsetDateTime"]);
    ov("Condition", "subject", &["subject.reference"]);
    ov("Condition", "patient", &["subject.reference"]);

    // MedicationRequest
    ov("MedicationRequest", "status", &["status"]);
    ov("MedicationRequest", "intent", &["intent"]);
    ov("MedicationRequest", "authoredon", &["authoredOn"]);
    ov("MedicationRequest", "subject", &["subject.reference"]);
    ov("MedicationRequest", "patient", &["subject.reference"]);
    ov(
        "MedicationRequest",
        "medication",
        &["medicationReference.reference"],
    );

    let std_ = |pt: SearchParameterType, param: &str, paths: &[&str]| {
        registry.register_standard(
            pt,
            param,
            paths.iter().map(ToString::to_string).collect(),
        );
    };

    // Resource-agnostic fallbacks, consulted when no override matches.
    std_(SearchParameterType::Token, "_id", &["id"]);
    std_(SearchParameterType::Token, "status", &["status"]);
    std_(SearchParameterType::Token, "active", &["active"]);
    std_(SearchParameterType::Token, "gender", &["gender"]);
    std_(SearchParameterType::Token, "code", &["code.coding[*].code"]);
    std_(
        SearchParameterType::Token,
        "identifier",
        &["identifier[*].value"],
    );

    std_(
        SearchParameterType::Date,
        "date",
        &["date", "effectiveDateTime"],
    );
    std_(SearchParameterType::Date, "birthdate", &["birthDate"]);

    std_(SearchParameterType::String, "name", &["name"]);
    std_(SearchParameterType::String, "title", &["title"]);
    std_(SearchParameterType::String, "description", &["description"]);
    std_(SearchParameterType::String, "address", &["address[*].text"]);

    std_(
        SearchParameterType::Reference,
        "subject",
        &["subject.reference"],
    );
    std_(
        SearchParameterType::Reference,
        "patient",
        &["subject.reference"],
    );
    std_(
        SearchParameterType::Reference,
        "encounter",
        &["encounter.reference"],
    );
    std_(
        SearchParameterType::Reference,
        "practitioner",
        &["practitioner.reference"],
    );
    std_(
        SearchParameterType::Reference,
        "organization",
        &["organization.reference"],
    );

    std_(
        SearchParameterType::Quantity,
        "value-quantity",
        &["valueQuantity.value"],
    );

    tracing::debug!(
        overrides = registry.override_count(),
        "Registered default search paths"
    );
}

/// Seeds the built-in functional index entries.
///
/// Every accessor here must stay in lockstep with the expression indexes
/// the schema manager creates; [`FunctionalIndexRegistry::index_definitions`]
/// is derived from these entries so they cannot drift apart.
pub fn register_default_indexes(registry: &FunctionalIndexRegistry) {
    registry.register("Patient.birthDate", "resource->>'birthDate'");
    registry.register("Patient.gender", "resource->>'gender'");
    registry.register("Patient.active", "resource->>'active'");

    registry.register(
        "Observation.effectiveDateTime",
        "resource->>'effectiveDateTime'",
    );
    registry.register("Observation.status", "resource->>'status'");
    registry.register(
        "Observation.subject.reference",
        "resource->'subject'->>'reference'",
    );

    registry.register("Encounter.period.start", "resource->'period'->>'start'");
    registry.register("Encounter.status", "resource->>'status'");

    registry.register("Condition.onsetDateTime", "resource->>'onsetDateTime'");

    registry.register("MedicationRequest.authoredOn", "resource->>'authoredOn'");
    registry.register("MedicationRequest.status", "resource->>'status'");

    tracing::debug!(count = registry.len(), "Registered functional indexes");
}
