//! FHIR Bundle envelope types.
//!
//! Search results are returned as a `searchset` Bundle: the matched resources
//! as raw JSON under `entry[].resource`, the match total, and a `self` link
//! reproducing the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A link in a Bundle (`self`, `next`, `previous`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

impl BundleLink {
    /// Creates the `self` link for a search response.
    #[must_use]
    pub fn self_link(url: impl Into<String>) -> Self {
        Self {
            relation: "self".to_string(),
            url: url.into(),
        }
    }
}

/// Search component of a Bundle entry (used in searchset bundles).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEntrySearch {
    /// "match" for primary search results, "include" for related resources.
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl BundleEntrySearch {
    #[must_use]
    pub fn match_mode() -> Self {
        Self {
            mode: "match".to_string(),
            score: None,
        }
    }
}

/// A single entry in a Bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<BundleEntrySearch>,
}

impl BundleEntry {
    /// Creates a `search.mode = "match"` entry wrapping a raw resource.
    #[must_use]
    pub fn matched(resource: Value) -> Self {
        Self {
            full_url: None,
            resource,
            search: Some(BundleEntrySearch::match_mode()),
        }
    }
}

/// A FHIR Bundle resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: &'static str,
    #[serde(rename = "type")]
    pub bundle_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub link: Vec<BundleLink>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    /// Builds a `searchset` Bundle from matched resources.
    #[must_use]
    pub fn searchset(total: u64, entries: Vec<BundleEntry>, links: Vec<BundleLink>) -> Self {
        Self {
            resource_type: "Bundle",
            bundle_type: "searchset".to_string(),
            total: Some(total),
            link: links,
            entry: entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn searchset_serializes_with_fhir_field_names() {
        let bundle = Bundle::searchset(
            1,
            vec![BundleEntry::matched(json!({
                "resourceType": "Patient",
                "id": "p1"
            }))],
            vec![BundleLink::self_link("Patient?family=Smith")],
        );

        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["resourceType"], "Bundle");
        assert_eq!(value["type"], "searchset");
        assert_eq!(value["total"], 1);
        assert_eq!(value["entry"][0]["search"]["mode"], "match");
        assert_eq!(value["entry"][0]["resource"]["id"], "p1");
        assert_eq!(value["link"][0]["relation"], "self");
        assert_eq!(value["link"][0]["url"], "Patient?family=Smith");
    }

    #[test]
    fn empty_searchset_omits_entry_array() {
        let bundle = Bundle::searchset(0, vec![], vec![]);
        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["total"], 0);
        assert!(value.get("entry").is_none());
    }
}
