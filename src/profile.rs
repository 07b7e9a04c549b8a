// Jurisdiction profile
//
// One value describing which data standard the authority works to. Scottish
// authorities (OneScotland) carry maintenance responsibility, reinstatement
// category and OS special designation records; English and Welsh authorities
// (GeoPlace) carry the ASD records when the authority maintains them. Welsh
// authorities hold every descriptor and LPI in both languages.

use crate::record_type::RecordType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jurisdiction {
    England,
    Wales,
    Scotland,
}

impl Jurisdiction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Jurisdiction::England => "England",
            Jurisdiction::Wales => "Wales",
            Jurisdiction::Scotland => "Scotland",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub jurisdiction: Jurisdiction,

    /// Authority maintains Additional Street Data (interest, construction,
    /// special designation, HWW restriction, PRoW)
    pub has_asd: bool,
}

impl Profile {
    pub fn new(jurisdiction: Jurisdiction, has_asd: bool) -> Self {
        Profile {
            jurisdiction,
            has_asd,
        }
    }

    pub fn england() -> Self {
        Profile::new(Jurisdiction::England, true)
    }

    pub fn wales() -> Self {
        Profile::new(Jurisdiction::Wales, true)
    }

    pub fn scotland() -> Self {
        Profile::new(Jurisdiction::Scotland, false)
    }

    pub fn is_scottish(&self) -> bool {
        self.jurisdiction == Jurisdiction::Scotland
    }

    pub fn is_welsh(&self) -> bool {
        self.jurisdiction == Jurisdiction::Wales
    }

    /// Language codes descriptors and LPIs may carry
    pub fn languages(&self) -> &'static [&'static str] {
        match self.jurisdiction {
            Jurisdiction::England => &["ENG"],
            Jurisdiction::Wales => &["ENG", "CYM"],
            Jurisdiction::Scotland => &["ENG", "GAE"],
        }
    }

    /// Whether records of this type exist under this profile
    pub fn supports(&self, record_type: RecordType) -> bool {
        if record_type.is_scottish_only() {
            return self.is_scottish();
        }
        if record_type.is_asd() {
            return !self.is_scottish() && self.has_asd;
        }
        true
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::england()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scottish_records_only_in_scotland() {
        assert!(Profile::scotland().supports(RecordType::MaintenanceResponsibility));
        assert!(!Profile::england().supports(RecordType::MaintenanceResponsibility));
        assert!(!Profile::wales().supports(RecordType::OsSpecialDesignation));
    }

    #[test]
    fn test_asd_records_follow_flag() {
        let with_asd = Profile::new(Jurisdiction::England, true);
        let without_asd = Profile::new(Jurisdiction::England, false);

        assert!(with_asd.supports(RecordType::Interest));
        assert!(!without_asd.supports(RecordType::Interest));
        assert!(!Profile::new(Jurisdiction::Scotland, true).supports(RecordType::PublicRightOfWay));
    }

    #[test]
    fn test_core_records_always_supported() {
        for profile in [Profile::england(), Profile::wales(), Profile::scotland()] {
            assert!(profile.supports(RecordType::Descriptor));
            assert!(profile.supports(RecordType::Lpi));
            assert!(profile.supports(RecordType::Esu));
        }
    }

    #[test]
    fn test_languages() {
        assert_eq!(Profile::wales().languages(), &["ENG", "CYM"]);
        assert_eq!(Profile::england().languages(), &["ENG"]);
    }
}
