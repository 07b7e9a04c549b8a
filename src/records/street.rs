// Street aggregate
//
// A street (USRN) with its descriptors, ESUs and the street-level records of
// both data standards. ESUs own their highway dedications and one-way
// exemptions.

use super::{ChangeType, Stamp};
use crate::record_type::RecordType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// STREET (root)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Street {
    pub usrn: i64,

    /// 1 designated name, 2 street description, 3 numbered street,
    /// 4 unofficial, 9 private (Scotland)
    pub record_type: i32,

    #[serde(default)]
    pub state: Option<i32>,
    #[serde(default)]
    pub state_date: Option<NaiveDate>,
    #[serde(default)]
    pub street_surface: Option<i32>,
    #[serde(default)]
    pub street_classification: Option<i32>,

    /// Custodian authority code
    pub authority: i32,

    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub version: i64,

    /// Never persisted: there is no source to compare against
    #[serde(default)]
    pub new_street: bool,

    #[serde(flatten)]
    pub stamp: Stamp,

    #[serde(default)]
    pub descriptors: Vec<Descriptor>,
    #[serde(default)]
    pub esus: Vec<Esu>,
    #[serde(default)]
    pub maintenance_responsibilities: Vec<MaintenanceResponsibility>,
    #[serde(default)]
    pub reinstatement_categories: Vec<ReinstatementCategory>,
    #[serde(default)]
    pub os_special_designations: Vec<OsSpecialDesignation>,
    #[serde(default)]
    pub interests: Vec<Interest>,
    #[serde(default)]
    pub constructions: Vec<Construction>,
    #[serde(default)]
    pub special_designations: Vec<SpecialDesignation>,
    #[serde(default)]
    pub hww_restrictions: Vec<HwwRestriction>,
    #[serde(default)]
    pub public_rights_of_way: Vec<PublicRightOfWay>,
    #[serde(default)]
    pub notes: Vec<StreetNote>,
}

/// Root-level keys ignored when comparing whole streets
pub const STREET_IGNORE_KEYS: &[&str] = &[
    "changeType",
    "entryDate",
    "lastUpdateDate",
    "lastUpdated",
    "lastUser",
    "version",
    "newStreet",
    "esuVersion",
];

impl Street {
    pub fn new(usrn: i64, record_type: i32, authority: i32) -> Self {
        Street {
            usrn,
            record_type,
            authority,
            version: 1,
            ..Default::default()
        }
    }

    /// Empty street for the "create street" action
    pub fn blank(authority: i32) -> Self {
        Street {
            record_type: 1,
            authority,
            new_street: true,
            ..Default::default()
        }
    }

    pub fn esu(&self, esu_id: i64) -> Option<&Esu> {
        self.esus.iter().find(|e| e.esu_id == esu_id)
    }

    /// Descriptor in the given language, if any
    pub fn descriptor(&self, language: &str) -> Option<&Descriptor> {
        self.descriptors
            .iter()
            .find(|d| d.language.eq_ignore_ascii_case(language) && d.change_type != ChangeType::Delete)
    }

    /// Display name: the English descriptor, or the first one present
    pub fn name(&self) -> String {
        self.descriptor("ENG")
            .or_else(|| self.descriptors.first())
            .map(|d| d.description.clone())
            .unwrap_or_else(|| format!("USRN {}", self.usrn))
    }
}

// ============================================================================
// DESCRIPTOR (15)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub description: String,
    pub language: String,
    #[serde(default)]
    pub locality_ref: Option<i64>,
    #[serde(default)]
    pub town_ref: Option<i64>,
    #[serde(default)]
    pub island_ref: Option<i64>,
    #[serde(default)]
    pub admin_area_ref: Option<i64>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(Descriptor, RecordType::Descriptor, pk_id);

impl Descriptor {
    pub fn new(pk_id: i64, usrn: i64, description: &str, language: &str) -> Self {
        Descriptor {
            pk_id,
            usrn,
            description: description.to_string(),
            language: language.to_string(),
            ..Default::default()
        }
    }
}

// ============================================================================
// ESU (13) and its children (16, 17)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Esu {
    /// Primary key of an ESU is its ESU id
    pub esu_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    #[serde(default)]
    pub esu_version: i64,
    /// 1 both directions, 2 in direction, 3 against direction
    pub direction: i32,
    #[serde(default)]
    pub tolerance: Option<i32>,
    #[serde(default)]
    pub state: Option<i32>,
    #[serde(default)]
    pub classification: Option<i32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub wkt_geometry: String,
    #[serde(default)]
    pub highway_dedications: Vec<HighwayDedication>,
    #[serde(default)]
    pub one_way_exemptions: Vec<OneWayExemption>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

/// An ESU's own form does not edit its children
pub const ESU_IGNORE_KEYS: &[&str] = &[
    "changeType",
    "entryDate",
    "lastUpdateDate",
    "lastUpdated",
    "lastUser",
    "esuVersion",
    "highwayDedications",
    "oneWayExemptions",
];

impl_record!(Esu, RecordType::Esu, esu_id, ignore = ESU_IGNORE_KEYS);

impl Esu {
    pub fn new(esu_id: i64, usrn: i64, direction: i32) -> Self {
        Esu {
            esu_id,
            usrn,
            direction,
            esu_version: 1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighwayDedication {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub esu_id: i64,
    /// Highway dedication code (e.g. 2 all vehicles, 4 pedestrian way)
    pub code: i32,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub seasonal: bool,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(HighwayDedication, RecordType::HighwayDedication, pk_id, esu_child);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneWayExemption {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub esu_id: i64,
    pub exemption_type: i32,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub periodicity_code: Option<i32>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(OneWayExemption, RecordType::OneWayExemption, pk_id, esu_child);

// ============================================================================
// SCOTTISH STREET RECORDS (51, 52, 53)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceResponsibility {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub custodian_code: i32,
    pub maintaining_authority_code: i32,
    pub street_status: i32,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(MaintenanceResponsibility, RecordType::MaintenanceResponsibility, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReinstatementCategory {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub custodian_code: i32,
    pub reinstatement_authority_code: i32,
    pub category: i32,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(ReinstatementCategory, RecordType::ReinstatementCategory, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsSpecialDesignation {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub custodian_code: i32,
    pub authority_code: i32,
    pub special_designation: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(OsSpecialDesignation, RecordType::OsSpecialDesignation, pk_id);

// ============================================================================
// ASD RECORDS (61, 62, 63, 64, 66)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub street_status: i32,
    pub interest_type: i32,
    pub swa_org_ref_authority: i32,
    #[serde(default)]
    pub district_ref_authority: Option<i32>,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(Interest, RecordType::Interest, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Construction {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub construction_type: i32,
    #[serde(default)]
    pub reinstatement_type_code: Option<i32>,
    #[serde(default)]
    pub aggregate_abrasion_val: Option<i32>,
    #[serde(default)]
    pub polished_stone_val: Option<i32>,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(Construction, RecordType::Construction, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialDesignation {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub designation_type: i32,
    #[serde(default)]
    pub swa_org_ref_consultant: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(SpecialDesignation, RecordType::SpecialDesignation, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HwwRestriction {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub restriction_code: i32,
    pub value_metric: f64,
    #[serde(default)]
    pub tro_text: Option<String>,
    #[serde(default)]
    pub whole_road: bool,
    #[serde(default)]
    pub specific_location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(HwwRestriction, RecordType::HwwRestriction, pk_id);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRightOfWay {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub prow_status: String,
    pub prow_rights: i32,
    #[serde(default)]
    pub prow_length: Option<f64>,
    #[serde(default)]
    pub pedestrian_access: bool,
    #[serde(default)]
    pub equestrian_access: bool,
    #[serde(default)]
    pub cycle_access: bool,
    #[serde(default)]
    pub prow_org_ref_consultant: Option<i32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(PublicRightOfWay, RecordType::PublicRightOfWay, pk_id);

// ============================================================================
// NOTE (72)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetNote {
    pub pk_id: i64,
    #[serde(default)]
    pub change_type: ChangeType,
    pub usrn: i64,
    pub seq_num: i32,
    pub note: String,
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl_record!(StreetNote, RecordType::StreetNote, pk_id);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Record;

    #[test]
    fn test_blank_street_is_new() {
        let street = Street::blank(9050);
        assert!(street.new_street);
        assert_eq!(street.usrn, 0);
        assert!(street.descriptors.is_empty());
    }

    #[test]
    fn test_street_name_prefers_english() {
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(2, 100, "Stryd Fawr", "CYM"));
        street.descriptors.push(Descriptor::new(1, 100, "High Street", "ENG"));

        assert_eq!(street.name(), "High Street");
        assert_eq!(Street::new(7, 1, 9050).name(), "USRN 7");
    }

    #[test]
    fn test_serializes_camel_case_with_flattened_stamp() {
        let mut descriptor = Descriptor::new(1, 100, "High Street", "ENG");
        descriptor.stamp.last_user = Some("editor".to_string());

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["pkId"], 1);
        assert_eq!(value["lastUser"], "editor");
        assert_eq!(value["changeType"], "N");
        assert!(value.get("stamp").is_none());
    }

    #[test]
    fn test_esu_children_report_owner() {
        let hd = HighwayDedication {
            pk_id: 3,
            esu_id: 55,
            code: 2,
            ..Default::default()
        };
        assert_eq!(hd.esu_id(), Some(55));
        assert_eq!(Esu::new(55, 100, 1).esu_id(), None);
        assert_eq!(Esu::new(55, 100, 1).pk_id(), 55);
    }
}
