// Property aggregate
//
// A BLPU (UPRN) with its LPIs and the property-level records. Child
// properties point back at their parent through parent_uprn.

use super::{ChangeType, Stamp};
use crate::record_type::RecordType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// PROPERTY (root)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub uprn: i64,

    /// 1 approved, 3 alternative, 6 provisional, 8 historical
    pub logical_status: i32,

    #[serde(default)]
    pub blpu_state: Option<i32>,
    #[serde(default)]
    pub blpu_state_date: Option<NaiveDate>,

    /// Representative point code
    #[serde(default)]
    pub rpc: i32,

    #[serde(default)]
    pub parent_uprn: Option<i64>,

    #[serde(default)]
    pub x_coordinate: f64,
    #[serde(default)]
    pub y_coordinate: f64,

    #[serde(default)]
    pub level: Option<f64>,

    pub authority: i32,

    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub version: i64,

    /// Never persisted: there is no source to compare against
    #[serde(default)]
    pub new_property: bool,

    #[serde(flatten)]
    pub stamp: Stamp,

    #[serde(default)]
    pub lpis: Vec<Lpi>,
    #[serde(default)]
    pub provenances: Vec<Provenance>,
    #[serde(default)]
    pub cross_references: Vec<CrossReference>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub organisations: Vec<Organisation>,
    #[serde(default)]
    pub successor_cross_references: Vec<SuccessorCrossReference>,
    #[serde(default)]
    pub notes: Vec<PropertyNote>,
}

/// Root-level keys ignored when comparing whole properties
pub const PROPERTY_IGNORE_KEYS: &[&str] = &[
    "changeType",
    "entryDate",
    "lastUpdateDate",
    "lastUpdated",
    "lastUser",
    "version",
    "newProperty",
    "lpiKey",
];

impl Property {
    pub fn new(uprn: i64, logical_status: i32, authority: i32) -> Self {
        Property {
            uprn,
            logical_status,
            authority,
            rpc: 1,
            version: 1,
            ..Default::default()
        }
    }

    /// Empty property for the "create property" action
    pub fn blank(authority: i32) -> Self {
        Property {
            logical_status: 6,
            authority,
            rpc: 1,
            new_property: true,
            ..Default::default()
        }
    }

    /// LPI whose PAO is propagated to child properties: the approved
    /// English LPI, otherwise the first live one
    pub fn primary_lpi(&self) -> Option<&Lpi> {
        let live = || self.lpis.iter().filter(|l| l.change_type != ChangeType::Delete);
        live()
            .find(|l| l.logical_status == 1 && l.language == "ENG")
            .or_else(|| live().next())
    }

    /// Copy the parent's PAO onto every LPI of this (child) property
    pub fn apply_pao_from(&mut self, parent: &Property) -> bool {
        let pao = match parent.primary_lpi() {
            Some(lpi) => lpi.pao(),
            None => return false,
        };

        let mut touched = false;
        for lpi in self.lpis.iter_mut() {
            if lpi.pao() != pao {
                lpi.set_pao(&pao);
                if lpi.change_type == ChangeType::Unchanged {
                    lpi.change_type = ChangeType::Update;
                }
                touched = true;
            }
        }
        touched
    }

    pub fn address(&self) -> String {
        self.primary_lpi()
            .map(|l| l.address_line())
            .unwrap_or_else(|| format!("UPRN {}", self.uprn))
    }
}

// ============================================================================
// LPI (24)
// ============================================================================

/// Primary addressable object fields shared between parent and children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaoDetails {
    pub pao_start_number: Option<i32>,
    pub pao_start_suffix: Option<String>,
    pub pao_end_number: Option<i32>,
    pub pao_end_suffix: Option<String>,
    pub pao_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lpi {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    #[serde(default)]
    pub lpi_key: Option<String>,
    pub language: String,
    pub logical_status: i32,
    #[serde(default)]
    pub sao_start_number: Option<i32>,
    #[serde(default)]
    pub sao_start_suffix: Option<String>,
    #[serde(default)]
    pub sao_end_number: Option<i32>,
    #[serde(default)]
    pub sao_end_suffix: Option<String>,
    #[serde(default)]
    pub sao_text: Option<String>,
    #[serde(default)]
    pub pao_start_number: Option<i32>,
    #[serde(default)]
    pub pao_start_suffix: Option<String>,
    #[serde(default)]
    pub pao_end_number: Option<i32>,
    #[serde(default)]
    pub pao_end_suffix: Option<String>,
    #[serde(default)]
    pub pao_text: Option<String>,
    pub usrn: i64,
    #[serde(default)]
    pub postcode_ref: Option<i64>,
    #[serde(default)]
    pub post_town_ref: Option<i64>,
    #[serde(default)]
    pub official_flag: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

const LPI_IGNORE_KEYS: &[&str] = &[
    "changeType",
    "entryDate",
    "lastUpdateDate",
    "lastUpdated",
    "lastUser",
    "lpiKey",
];

impl_record!(Lpi, RecordType::Lpi, pk_id, ignore = LPI_IGNORE_KEYS);

impl Lpi {
    pub fn new(pk_id: i64, uprn: i64, usrn: i64, language: &str) -> Self {
        Lpi {
            pk_id,
            uprn,
            usrn,
            language: language.to_string(),
            logical_status: 1,
            ..Default::default()
        }
    }

    pub fn pao(&self) -> PaoDetails {
        PaoDetails {
            pao_start_number: self.pao_start_number,
            pao_start_suffix: self.pao_start_suffix.clone(),
            pao_end_number: self.pao_end_number,
            pao_end_suffix: self.pao_end_suffix.clone(),
            pao_text: self.pao_text.clone(),
        }
    }

    pub fn set_pao(&mut self, pao: &PaoDetails) {
        self.pao_start_number = pao.pao_start_number;
        self.pao_start_suffix = pao.pao_start_suffix.clone();
        self.pao_end_number = pao.pao_end_number;
        self.pao_end_suffix = pao.pao_end_suffix.clone();
        self.pao_text = pao.pao_text.clone();
    }

    /// "Flat 2, 14A Mill House" style single line
    pub fn address_line(&self) -> String {
        let number = |start: Option<i32>, start_sfx: &Option<String>, end: Option<i32>, end_sfx: &Option<String>| {
            let mut out = String::new();
            if let Some(n) = start {
                out.push_str(&n.to_string());
                out.push_str(start_sfx.as_deref().unwrap_or(""));
            }
            if let Some(n) = end {
                out.push('-');
                out.push_str(&n.to_string());
                out.push_str(end_sfx.as_deref().unwrap_or(""));
            }
            out
        };

        let mut parts: Vec<String> = Vec::new();
        let sao = [
            self.sao_text.clone().unwrap_or_default(),
            number(self.sao_start_number, &self.sao_start_suffix, self.sao_end_number, &self.sao_end_suffix),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
        if !sao.is_empty() {
            parts.push(sao);
        }

        let pao = [
            number(self.pao_start_number, &self.pao_start_suffix, self.pao_end_number, &self.pao_end_suffix),
            self.pao_text.clone().unwrap_or_default(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
        if !pao.is_empty() {
            parts.push(pao);
        }

        parts.join(", ")
    }
}

// ============================================================================
// PROPERTY-LEVEL RECORDS (22, 23, 30, 31, 32, 71)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    #[serde(default)]
    pub prov_key: Option<String>,
    pub provenance_code: String,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub wkt_geometry: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(Provenance, RecordType::Provenance, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossReference {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    #[serde(default)]
    pub xref_key: Option<String>,
    pub source_id: i64,
    pub cross_reference: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(CrossReference, RecordType::CrossReference, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessorCrossReference {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    #[serde(default)]
    pub succ_key: Option<String>,
    pub successor: i64,
    pub successor_type: i32,
    #[serde(default)]
    pub predecessor: Option<i64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(SuccessorCrossReference, RecordType::SuccessorCrossReference, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organisation {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    #[serde(default)]
    pub org_key: Option<String>,
    pub organisation: String,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(Organisation, RecordType::Organisation, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    #[serde(default)]
    pub class_key: Option<String>,
    pub class_scheme: String,
    pub blpu_class: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(Classification, RecordType::Classification, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyNote {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub uprn: i64,
    pub seq_num: i32,
    pub note: String,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(PropertyNote, RecordType::PropertyNote, pk_id);

#[cfg(test)]
mod tests {
    use super::*;

    fn lpi_with_pao(pk_id: i64, uprn: i64, number: i32, text: &str) -> Lpi {
        let mut lpi = Lpi::new(pk_id, uprn, 100, "ENG");
        lpi.pao_start_number = Some(number);
        lpi.pao_text = Some(text.to_string());
        lpi
    }

    #[test]
    fn test_address_line() {
        let mut lpi = lpi_with_pao(1, 10, 14, "Mill House");
        lpi.pao_start_suffix = Some("A".to_string());
        lpi.sao_text = Some("Flat".to_string());
        lpi.sao_start_number = Some(2);

        assert_eq!(lpi.address_line(), "Flat 2, 14A Mill House");
    }

    #[test]
    fn test_primary_lpi_prefers_approved_english() {
        let mut property = Property::new(10, 1, 9050);
        let mut welsh = lpi_with_pao(1, 10, 1, "Tŷ Melin");
        welsh.language = "CYM".to_string();
        property.lpis.push(welsh);
        property.lpis.push(lpi_with_pao(2, 10, 1, "Mill House"));

        assert_eq!(property.primary_lpi().map(|l| l.pk_id), Some(2));
    }

    #[test]
    fn test_apply_pao_from_parent() {
        let mut parent = Property::new(10, 1, 9050);
        parent.lpis.push(lpi_with_pao(1, 10, 14, "Mill House"));

        let mut child = Property::new(11, 1, 9050);
        child.parent_uprn = Some(10);
        child.lpis.push(lpi_with_pao(5, 11, 12, "Old Mill"));

        assert!(child.apply_pao_from(&parent));
        assert_eq!(child.lpis[0].pao_start_number, Some(14));
        assert_eq!(child.lpis[0].pao_text.as_deref(), Some("Mill House"));
        assert_eq!(child.lpis[0].change_type, ChangeType::Update);

        // Second application is a no-op
        assert!(!child.apply_pao_from(&parent));
    }

    #[test]
    fn test_apply_pao_without_parent_lpi() {
        let parent = Property::new(10, 1, 9050);
        let mut child = Property::new(11, 1, 9050);
        child.lpis.push(lpi_with_pao(5, 11, 12, "Old Mill"));

        assert!(!child.apply_pao_from(&parent));
        assert_eq!(child.lpis[0].pao_start_number, Some(12));
    }
}
