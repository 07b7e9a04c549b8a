// Record type codes
//
// The numeric taxonomy used to route errors, edits and comparisons to the
// right sub-record schema.

use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// AGGREGATE TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    Street,
    Property,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Street => "street",
            AggregateType::Property => "property",
        }
    }

    /// Record type code of the aggregate root
    pub fn root(&self) -> RecordType {
        match self {
            AggregateType::Street => RecordType::Street,
            AggregateType::Property => RecordType::Property,
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RECORD TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum RecordType {
    Street,
    Esu,
    Descriptor,
    OneWayExemption,
    HighwayDedication,
    Property,
    Provenance,
    CrossReference,
    Lpi,
    SuccessorCrossReference,
    Organisation,
    Classification,
    MaintenanceResponsibility,
    ReinstatementCategory,
    OsSpecialDesignation,
    Interest,
    Construction,
    SpecialDesignation,
    HwwRestriction,
    PublicRightOfWay,
    PropertyNote,
    StreetNote,
}

impl RecordType {
    pub const ALL: [RecordType; 22] = [
        RecordType::Street,
        RecordType::Esu,
        RecordType::Descriptor,
        RecordType::OneWayExemption,
        RecordType::HighwayDedication,
        RecordType::Property,
        RecordType::Provenance,
        RecordType::CrossReference,
        RecordType::Lpi,
        RecordType::SuccessorCrossReference,
        RecordType::Organisation,
        RecordType::Classification,
        RecordType::MaintenanceResponsibility,
        RecordType::ReinstatementCategory,
        RecordType::OsSpecialDesignation,
        RecordType::Interest,
        RecordType::Construction,
        RecordType::SpecialDesignation,
        RecordType::HwwRestriction,
        RecordType::PublicRightOfWay,
        RecordType::PropertyNote,
        RecordType::StreetNote,
    ];

    pub fn code(&self) -> u16 {
        match self {
            RecordType::Street => 11,
            RecordType::Esu => 13,
            RecordType::Descriptor => 15,
            RecordType::OneWayExemption => 16,
            RecordType::HighwayDedication => 17,
            RecordType::Property => 21,
            RecordType::Provenance => 22,
            RecordType::CrossReference => 23,
            RecordType::Lpi => 24,
            RecordType::SuccessorCrossReference => 30,
            RecordType::Organisation => 31,
            RecordType::Classification => 32,
            RecordType::MaintenanceResponsibility => 51,
            RecordType::ReinstatementCategory => 52,
            RecordType::OsSpecialDesignation => 53,
            RecordType::Interest => 61,
            RecordType::Construction => 62,
            RecordType::SpecialDesignation => 63,
            RecordType::HwwRestriction => 64,
            RecordType::PublicRightOfWay => 66,
            RecordType::PropertyNote => 71,
            RecordType::StreetNote => 72,
        }
    }

    pub fn from_code(code: u16) -> Option<RecordType> {
        RecordType::ALL.iter().copied().find(|rt| rt.code() == code)
    }

    /// Name shown in the "these records have changed" prompt
    pub fn display_name(&self) -> &'static str {
        match self {
            RecordType::Street => "street",
            RecordType::Esu => "ESU",
            RecordType::Descriptor => "descriptor",
            RecordType::OneWayExemption => "one-way exemption",
            RecordType::HighwayDedication => "highway dedication",
            RecordType::Property => "property",
            RecordType::Provenance => "provenance",
            RecordType::CrossReference => "cross reference",
            RecordType::Lpi => "LPI",
            RecordType::SuccessorCrossReference => "successor cross reference",
            RecordType::Organisation => "organisation",
            RecordType::Classification => "classification",
            RecordType::MaintenanceResponsibility => "maintenance responsibility",
            RecordType::ReinstatementCategory => "reinstatement category",
            RecordType::OsSpecialDesignation => "special designation",
            RecordType::Interest => "interested organisation",
            RecordType::Construction => "construction",
            RecordType::SpecialDesignation => "special designation",
            RecordType::HwwRestriction => "height, width and weight restriction",
            RecordType::PublicRightOfWay => "public right of way",
            RecordType::PropertyNote | RecordType::StreetNote => "note",
        }
    }

    /// Section heading used in the copied error report
    pub fn title(&self) -> &'static str {
        match self {
            RecordType::Street => "Street",
            RecordType::Esu => "ESU",
            RecordType::Descriptor => "Descriptor",
            RecordType::OneWayExemption => "One-way exemption",
            RecordType::HighwayDedication => "Highway dedication",
            RecordType::Property => "Property",
            RecordType::Provenance => "Provenance",
            RecordType::CrossReference => "Cross reference",
            RecordType::Lpi => "LPI",
            RecordType::SuccessorCrossReference => "Successor cross reference",
            RecordType::Organisation => "Organisation",
            RecordType::Classification => "Classification",
            RecordType::MaintenanceResponsibility => "Maintenance responsibility",
            RecordType::ReinstatementCategory => "Reinstatement category",
            RecordType::OsSpecialDesignation => "Special designation",
            RecordType::Interest => "Interested organisation",
            RecordType::Construction => "Construction",
            RecordType::SpecialDesignation => "Special designation",
            RecordType::HwwRestriction => "Height, width and weight restriction",
            RecordType::PublicRightOfWay => "Public right of way",
            RecordType::PropertyNote | RecordType::StreetNote => "Note",
        }
    }

    pub fn aggregate(&self) -> AggregateType {
        match self {
            RecordType::Property
            | RecordType::Provenance
            | RecordType::CrossReference
            | RecordType::Lpi
            | RecordType::SuccessorCrossReference
            | RecordType::Organisation
            | RecordType::Classification
            | RecordType::PropertyNote => AggregateType::Property,
            _ => AggregateType::Street,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, RecordType::Street | RecordType::Property)
    }

    /// Records owned by an ESU rather than by the street directly
    pub fn is_esu_child(&self) -> bool {
        matches!(self, RecordType::HighwayDedication | RecordType::OneWayExemption)
    }

    pub fn is_asd(&self) -> bool {
        matches!(
            self,
            RecordType::Interest
                | RecordType::Construction
                | RecordType::SpecialDesignation
                | RecordType::HwwRestriction
                | RecordType::PublicRightOfWay
        )
    }

    pub fn is_scottish_only(&self) -> bool {
        matches!(
            self,
            RecordType::MaintenanceResponsibility
                | RecordType::ReinstatementCategory
                | RecordType::OsSpecialDesignation
        )
    }

    pub fn applies_to(&self, profile: &Profile) -> bool {
        profile.supports(*self)
    }
}

impl From<RecordType> for u16 {
    fn from(rt: RecordType) -> u16 {
        rt.code()
    }
}

impl TryFrom<u16> for RecordType {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        RecordType::from_code(code).ok_or_else(|| format!("Unknown record type code: {}", code))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_table() {
        for rt in RecordType::ALL {
            assert_eq!(RecordType::from_code(rt.code()), Some(rt));
        }
        assert_eq!(RecordType::from_code(12), None);
        assert_eq!(RecordType::from_code(65), None);
    }

    #[test]
    fn test_street_has_thirteen_sub_record_kinds() {
        let street_children = RecordType::ALL
            .iter()
            .filter(|rt| rt.aggregate() == AggregateType::Street && !rt.is_root())
            .count();
        let property_children = RecordType::ALL
            .iter()
            .filter(|rt| rt.aggregate() == AggregateType::Property && !rt.is_root())
            .count();

        assert_eq!(street_children, 13);
        assert_eq!(property_children, 7);
    }

    #[test]
    fn test_serde_uses_numeric_code() {
        let json = serde_json::to_string(&RecordType::Lpi).unwrap();
        assert_eq!(json, "24");

        let back: RecordType = serde_json::from_str("17").unwrap();
        assert_eq!(back, RecordType::HighwayDedication);
        assert!(serde_json::from_str::<RecordType>("99").is_err());
    }

    #[test]
    fn test_esu_children() {
        assert!(RecordType::HighwayDedication.is_esu_child());
        assert!(RecordType::OneWayExemption.is_esu_child());
        assert!(!RecordType::Esu.is_esu_child());
    }
}
