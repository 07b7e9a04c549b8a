// Lookup table responses
//
// Lookup CRUD goes through an external service; this module interprets its
// responses and merges returned entries into the in-memory lists. Merging is
// pure: the current list is never modified in place.

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// LOOKUP KINDS AND ENTRIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LookupKind {
    Postcode,
    PostTown,
    SubLocality,
    CrossReference,
    Locality,
    Town,
    Island,
    AdministrativeArea,
    Ward,
    Parish,
    DbAuthority,
    OperationalDistrict,
}

impl LookupKind {
    pub const ALL: [LookupKind; 12] = [
        LookupKind::Postcode,
        LookupKind::PostTown,
        LookupKind::SubLocality,
        LookupKind::CrossReference,
        LookupKind::Locality,
        LookupKind::Town,
        LookupKind::Island,
        LookupKind::AdministrativeArea,
        LookupKind::Ward,
        LookupKind::Parish,
        LookupKind::DbAuthority,
        LookupKind::OperationalDistrict,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            LookupKind::Postcode => "Postcode",
            LookupKind::PostTown => "Post town",
            LookupKind::SubLocality => "Sub-locality",
            LookupKind::CrossReference => "Cross reference",
            LookupKind::Locality => "Locality",
            LookupKind::Town => "Town",
            LookupKind::Island => "Island",
            LookupKind::AdministrativeArea => "Administrative area",
            LookupKind::Ward => "Ward",
            LookupKind::Parish => "Parish",
            LookupKind::DbAuthority => "Authority",
            LookupKind::OperationalDistrict => "Operational district",
        }
    }

    /// Entries held once per language (Welsh and Gaelic alongside English)
    pub fn is_multilingual(&self) -> bool {
        matches!(
            self,
            LookupKind::PostTown
                | LookupKind::SubLocality
                | LookupKind::Locality
                | LookupKind::Town
                | LookupKind::Island
                | LookupKind::AdministrativeArea
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupEntry {
    pub id: i64,
    pub kind: LookupKind,
    pub value: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Linked English entry for translations
    #[serde(default)]
    pub linked_ref: Option<i64>,
    #[serde(default)]
    pub historic: bool,
    #[serde(default)]
    pub enabled: bool,
}

impl LookupEntry {
    fn same_entry(&self, other: &LookupEntry) -> bool {
        self.kind == other.kind && self.id == other.id && self.language == other.language
    }
}

/// The list after applying saved entries: replace by id (and language), or
/// append when new
pub fn updated_lookups(current: &[LookupEntry], changed: &[LookupEntry]) -> Vec<LookupEntry> {
    let mut updated = current.to_vec();
    for entry in changed {
        match updated.iter_mut().find(|e| e.same_entry(entry)) {
            Some(existing) => *existing = entry.clone(),
            None => updated.push(entry.clone()),
        }
    }
    updated
}

// ============================================================================
// RESPONSE CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LookupResponse {
    Ok(Value),
    /// Field-level messages from a 400 body
    Validation(BTreeMap<String, Vec<String>>),
    /// Caller must re-authenticate
    Unauthorised,
    Failed(u16, String),
}

impl LookupResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, LookupResponse::Ok(_))
    }
}

/// "PostcodeRef" -> "postcodeRef"
fn lower_camel(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn validation_errors(body: &Value) -> BTreeMap<String, Vec<String>> {
    let fields = match body.get("errors") {
        Some(Value::Object(map)) => map,
        _ => match body {
            Value::Object(map) => map,
            _ => return BTreeMap::new(),
        },
    };

    fields
        .iter()
        .map(|(field, value)| (lower_camel(field), messages(value)))
        .filter(|(_, messages)| !messages.is_empty())
        .collect()
}

/// Interpret a lookup service response. Failures are logged when
/// `show_diagnostics` is set.
pub fn classify_response(status: u16, body: &str, settings: &Settings) -> LookupResponse {
    let parsed: Option<Value> = if body.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str(body).ok()
    };

    if !(200..300).contains(&status) && settings.show_diagnostics {
        tracing::warn!(status, body, "Lookup request failed");
    }

    match status {
        200..=299 => match parsed {
            Some(value) => LookupResponse::Ok(value),
            None => LookupResponse::Failed(status, "Response body is not valid JSON".to_string()),
        },
        400 => LookupResponse::Validation(parsed.as_ref().map(validation_errors).unwrap_or_default()),
        401 => LookupResponse::Unauthorised,
        _ => {
            let message = parsed
                .as_ref()
                .and_then(|v| v.get("title").or_else(|| v.get("message")))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unexpected status {}", status));
            LookupResponse::Failed(status, message)
        }
    }
}
