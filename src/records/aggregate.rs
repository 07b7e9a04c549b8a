// Aggregate and sub-record sum types
//
// SubRecord tags every sub-record kind so comparison and reconciliation can
// dispatch on the variant instead of on hand-written per-type branches.

use super::property::PROPERTY_IGNORE_KEYS;
use super::street::STREET_IGNORE_KEYS;
use super::*;
use crate::record_type::{AggregateType, RecordType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// SUB-RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubRecord {
    Descriptor(Descriptor),
    Esu(Esu),
    HighwayDedication(HighwayDedication),
    OneWayExemption(OneWayExemption),
    MaintenanceResponsibility(MaintenanceResponsibility),
    ReinstatementCategory(ReinstatementCategory),
    OsSpecialDesignation(OsSpecialDesignation),
    Interest(Interest),
    Construction(Construction),
    SpecialDesignation(SpecialDesignation),
    HwwRestriction(HwwRestriction),
    PublicRightOfWay(PublicRightOfWay),
    StreetNote(StreetNote),
    Lpi(Lpi),
    Provenance(Provenance),
    CrossReference(CrossReference),
    Classification(Classification),
    Organisation(Organisation),
    SuccessorCrossReference(SuccessorCrossReference),
    PropertyNote(PropertyNote),
}

macro_rules! with_record {
    ($sub:expr, $r:ident => $body:expr) => {
        match $sub {
            SubRecord::Descriptor($r) => $body,
            SubRecord::Esu($r) => $body,
            SubRecord::HighwayDedication($r) => $body,
            SubRecord::OneWayExemption($r) => $body,
            SubRecord::MaintenanceResponsibility($r) => $body,
            SubRecord::ReinstatementCategory($r) => $body,
            SubRecord::OsSpecialDesignation($r) => $body,
            SubRecord::Interest($r) => $body,
            SubRecord::Construction($r) => $body,
            SubRecord::SpecialDesignation($r) => $body,
            SubRecord::HwwRestriction($r) => $body,
            SubRecord::PublicRightOfWay($r) => $body,
            SubRecord::StreetNote($r) => $body,
            SubRecord::Lpi($r) => $body,
            SubRecord::Provenance($r) => $body,
            SubRecord::CrossReference($r) => $body,
            SubRecord::Classification($r) => $body,
            SubRecord::Organisation($r) => $body,
            SubRecord::SuccessorCrossReference($r) => $body,
            SubRecord::PropertyNote($r) => $body,
        }
    };
}

fn type_of<T: Record>(_: &T) -> RecordType {
    T::RECORD_TYPE
}

fn ignore_keys_of<T: Record>(_: &T) -> &'static [&'static str] {
    T::IGNORE_KEYS
}

impl SubRecord {
    pub fn record_type(&self) -> RecordType {
        with_record!(self, r => type_of(r))
    }

    pub fn aggregate_type(&self) -> AggregateType {
        self.record_type().aggregate()
    }

    pub fn pk_id(&self) -> i64 {
        with_record!(self, r => r.pk_id())
    }

    pub fn esu_id(&self) -> Option<i64> {
        with_record!(self, r => r.esu_id())
    }

    pub fn change_type(&self) -> ChangeType {
        with_record!(self, r => r.change_type())
    }

    pub fn set_change_type(&mut self, change_type: ChangeType) {
        with_record!(self, r => r.set_change_type(change_type))
    }

    pub fn ignore_keys(&self) -> &'static [&'static str] {
        with_record!(self, r => ignore_keys_of(r))
    }

    pub fn is_new(&self) -> bool {
        self.pk_id() < 0
    }

    /// JSON shape used for field-level comparison
    pub fn to_value(&self) -> serde_json::Value {
        let value = with_record!(self, r => serde_json::to_value(r));
        // Plain derived structs with string keys always serialize
        value.unwrap_or(serde_json::Value::Null)
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Street(Street),
    Property(Property),
}

fn find_in<T: Record>(items: &[T], pk_id: i64) -> Option<T> {
    items.iter().find(|r| r.pk_id() == pk_id).cloned()
}

fn assign_keys_in<T: Record>(items: &mut [T]) -> Vec<(i64, i64)> {
    let mut next = next_key(items);
    let mut remapped = Vec::new();
    for record in items.iter_mut().filter(|r| r.pk_id() <= 0) {
        remapped.push((record.pk_id(), next));
        record.set_pk_id(next);
        next += 1;
    }
    remapped
}

fn settle_in<T: Record>(items: &mut Vec<T>, user: &str, now: DateTime<Utc>) {
    items.retain(|r| r.change_type() != ChangeType::Delete);
    for record in items.iter_mut() {
        if record.change_type() != ChangeType::Unchanged {
            record.stamp_mut().touch(user, now);
            record.set_change_type(ChangeType::Unchanged);
        }
    }
}

impl Aggregate {
    pub fn aggregate_type(&self) -> AggregateType {
        match self {
            Aggregate::Street(_) => AggregateType::Street,
            Aggregate::Property(_) => AggregateType::Property,
        }
    }

    /// USRN or UPRN
    pub fn key(&self) -> i64 {
        match self {
            Aggregate::Street(s) => s.usrn,
            Aggregate::Property(p) => p.uprn,
        }
    }

    pub fn is_new(&self) -> bool {
        match self {
            Aggregate::Street(s) => s.new_street,
            Aggregate::Property(p) => p.new_property,
        }
    }

    pub fn root_ignore_keys(&self) -> &'static [&'static str] {
        match self {
            Aggregate::Street(_) => STREET_IGNORE_KEYS,
            Aggregate::Property(_) => PROPERTY_IGNORE_KEYS,
        }
    }

    pub fn as_street(&self) -> Option<&Street> {
        match self {
            Aggregate::Street(s) => Some(s),
            Aggregate::Property(_) => None,
        }
    }

    pub fn as_property(&self) -> Option<&Property> {
        match self {
            Aggregate::Property(p) => Some(p),
            Aggregate::Street(_) => None,
        }
    }

    /// Human label used in prompts and copied reports
    pub fn label(&self) -> String {
        match self {
            Aggregate::Street(s) => s.name(),
            Aggregate::Property(p) => p.address(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        let value = match self {
            Aggregate::Street(s) => serde_json::to_value(s),
            Aggregate::Property(p) => serde_json::to_value(p),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Locate a sub-record by key. ESU children are looked up inside their
    /// owning ESU.
    pub fn find_record(
        &self,
        record_type: RecordType,
        pk_id: i64,
        esu_id: Option<i64>,
    ) -> Option<SubRecord> {
        match self {
            Aggregate::Street(s) => match record_type {
                RecordType::Descriptor => find_in(&s.descriptors, pk_id).map(SubRecord::Descriptor),
                RecordType::Esu => find_in(&s.esus, pk_id).map(SubRecord::Esu),
                RecordType::HighwayDedication => s
                    .esu(esu_id?)
                    .and_then(|esu| find_in(&esu.highway_dedications, pk_id))
                    .map(SubRecord::HighwayDedication),
                RecordType::OneWayExemption => s
                    .esu(esu_id?)
                    .and_then(|esu| find_in(&esu.one_way_exemptions, pk_id))
                    .map(SubRecord::OneWayExemption),
                RecordType::MaintenanceResponsibility => find_in(&s.maintenance_responsibilities, pk_id)
                    .map(SubRecord::MaintenanceResponsibility),
                RecordType::ReinstatementCategory => find_in(&s.reinstatement_categories, pk_id)
                    .map(SubRecord::ReinstatementCategory),
                RecordType::OsSpecialDesignation => find_in(&s.os_special_designations, pk_id)
                    .map(SubRecord::OsSpecialDesignation),
                RecordType::Interest => find_in(&s.interests, pk_id).map(SubRecord::Interest),
                RecordType::Construction => find_in(&s.constructions, pk_id).map(SubRecord::Construction),
                RecordType::SpecialDesignation => find_in(&s.special_designations, pk_id)
                    .map(SubRecord::SpecialDesignation),
                RecordType::HwwRestriction => find_in(&s.hww_restrictions, pk_id).map(SubRecord::HwwRestriction),
                RecordType::PublicRightOfWay => find_in(&s.public_rights_of_way, pk_id)
                    .map(SubRecord::PublicRightOfWay),
                RecordType::StreetNote => find_in(&s.notes, pk_id).map(SubRecord::StreetNote),
                _ => None,
            },
            Aggregate::Property(p) => match record_type {
                RecordType::Lpi => find_in(&p.lpis, pk_id).map(SubRecord::Lpi),
                RecordType::Provenance => find_in(&p.provenances, pk_id).map(SubRecord::Provenance),
                RecordType::CrossReference => find_in(&p.cross_references, pk_id).map(SubRecord::CrossReference),
                RecordType::Classification => find_in(&p.classifications, pk_id).map(SubRecord::Classification),
                RecordType::Organisation => find_in(&p.organisations, pk_id).map(SubRecord::Organisation),
                RecordType::SuccessorCrossReference => find_in(&p.successor_cross_references, pk_id)
                    .map(SubRecord::SuccessorCrossReference),
                RecordType::PropertyNote => find_in(&p.notes, pk_id).map(SubRecord::PropertyNote),
                _ => None,
            },
        }
    }

    /// Locate a sub-record by its position in the collection, as error
    /// entries do. ESU children also need the owning ESU's position.
    pub fn record_at(
        &self,
        record_type: RecordType,
        index: usize,
        esu_index: Option<usize>,
    ) -> Option<SubRecord> {
        fn at<T: Record>(items: &[T], index: usize) -> Option<T> {
            items.get(index).cloned()
        }

        match self {
            Aggregate::Street(s) => match record_type {
                RecordType::Descriptor => at(&s.descriptors, index).map(SubRecord::Descriptor),
                RecordType::Esu => at(&s.esus, index).map(SubRecord::Esu),
                RecordType::HighwayDedication => s
                    .esus
                    .get(esu_index?)
                    .and_then(|esu| at(&esu.highway_dedications, index))
                    .map(SubRecord::HighwayDedication),
                RecordType::OneWayExemption => s
                    .esus
                    .get(esu_index?)
                    .and_then(|esu| at(&esu.one_way_exemptions, index))
                    .map(SubRecord::OneWayExemption),
                RecordType::MaintenanceResponsibility => {
                    at(&s.maintenance_responsibilities, index).map(SubRecord::MaintenanceResponsibility)
                }
                RecordType::ReinstatementCategory => {
                    at(&s.reinstatement_categories, index).map(SubRecord::ReinstatementCategory)
                }
                RecordType::OsSpecialDesignation => {
                    at(&s.os_special_designations, index).map(SubRecord::OsSpecialDesignation)
                }
                RecordType::Interest => at(&s.interests, index).map(SubRecord::Interest),
                RecordType::Construction => at(&s.constructions, index).map(SubRecord::Construction),
                RecordType::SpecialDesignation => {
                    at(&s.special_designations, index).map(SubRecord::SpecialDesignation)
                }
                RecordType::HwwRestriction => at(&s.hww_restrictions, index).map(SubRecord::HwwRestriction),
                RecordType::PublicRightOfWay => at(&s.public_rights_of_way, index).map(SubRecord::PublicRightOfWay),
                RecordType::StreetNote => at(&s.notes, index).map(SubRecord::StreetNote),
                _ => None,
            },
            Aggregate::Property(p) => match record_type {
                RecordType::Lpi => at(&p.lpis, index).map(SubRecord::Lpi),
                RecordType::Provenance => at(&p.provenances, index).map(SubRecord::Provenance),
                RecordType::CrossReference => at(&p.cross_references, index).map(SubRecord::CrossReference),
                RecordType::Classification => at(&p.classifications, index).map(SubRecord::Classification),
                RecordType::Organisation => at(&p.organisations, index).map(SubRecord::Organisation),
                RecordType::SuccessorCrossReference => {
                    at(&p.successor_cross_references, index).map(SubRecord::SuccessorCrossReference)
                }
                RecordType::PropertyNote => at(&p.notes, index).map(SubRecord::PropertyNote),
                _ => None,
            },
        }
    }

    /// Give never-saved sub-records permanent keys and point every child at
    /// the aggregate's key
    pub fn assign_keys(&mut self) {
        match self {
            Aggregate::Street(s) => {
                let usrn = s.usrn;
                let esu_map = assign_keys_in(&mut s.esus);
                let mut next_hd = s
                    .esus
                    .iter()
                    .flat_map(|e| e.highway_dedications.iter().map(|h| h.pk_id))
                    .max()
                    .unwrap_or(0)
                    .max(0)
                    + 1;
                let mut next_owe = s
                    .esus
                    .iter()
                    .flat_map(|e| e.one_way_exemptions.iter().map(|o| o.pk_id))
                    .max()
                    .unwrap_or(0)
                    .max(0)
                    + 1;

                for esu in s.esus.iter_mut() {
                    esu.usrn = usrn;
                    let esu_id = esu.esu_id;
                    for hd in esu.highway_dedications.iter_mut() {
                        hd.esu_id = esu_id;
                        if hd.pk_id <= 0 {
                            hd.pk_id = next_hd;
                            next_hd += 1;
                        }
                    }
                    for owe in esu.one_way_exemptions.iter_mut() {
                        owe.esu_id = esu_id;
                        if owe.pk_id <= 0 {
                            owe.pk_id = next_owe;
                            next_owe += 1;
                        }
                    }
                }
                if !esu_map.is_empty() {
                    tracing::debug!(usrn, remapped = esu_map.len(), "Assigned ESU ids");
                }

                assign_keys_in(&mut s.descriptors);
                assign_keys_in(&mut s.maintenance_responsibilities);
                assign_keys_in(&mut s.reinstatement_categories);
                assign_keys_in(&mut s.os_special_designations);
                assign_keys_in(&mut s.interests);
                assign_keys_in(&mut s.constructions);
                assign_keys_in(&mut s.special_designations);
                assign_keys_in(&mut s.hww_restrictions);
                assign_keys_in(&mut s.public_rights_of_way);
                assign_keys_in(&mut s.notes);

                s.descriptors.iter_mut().for_each(|r| r.usrn = usrn);
                s.maintenance_responsibilities.iter_mut().for_each(|r| r.usrn = usrn);
                s.reinstatement_categories.iter_mut().for_each(|r| r.usrn = usrn);
                s.os_special_designations.iter_mut().for_each(|r| r.usrn = usrn);
                s.interests.iter_mut().for_each(|r| r.usrn = usrn);
                s.constructions.iter_mut().for_each(|r| r.usrn = usrn);
                s.special_designations.iter_mut().for_each(|r| r.usrn = usrn);
                s.hww_restrictions.iter_mut().for_each(|r| r.usrn = usrn);
                s.public_rights_of_way.iter_mut().for_each(|r| r.usrn = usrn);
                s.notes.iter_mut().for_each(|r| r.usrn = usrn);
            }
            Aggregate::Property(p) => {
                let uprn = p.uprn;
                assign_keys_in(&mut p.lpis);
                assign_keys_in(&mut p.provenances);
                assign_keys_in(&mut p.cross_references);
                assign_keys_in(&mut p.classifications);
                assign_keys_in(&mut p.organisations);
                assign_keys_in(&mut p.successor_cross_references);
                assign_keys_in(&mut p.notes);

                p.lpis.iter_mut().for_each(|r| r.uprn = uprn);
                p.provenances.iter_mut().for_each(|r| r.uprn = uprn);
                p.cross_references.iter_mut().for_each(|r| r.uprn = uprn);
                p.classifications.iter_mut().for_each(|r| r.uprn = uprn);
                p.organisations.iter_mut().for_each(|r| r.uprn = uprn);
                p.successor_cross_references.iter_mut().for_each(|r| r.uprn = uprn);
                p.notes.iter_mut().for_each(|r| r.uprn = uprn);
            }
        }
    }

    /// Post-save state: deleted records dropped, change markers cleared,
    /// touched records stamped, version bumped, no longer new
    pub fn settle(&mut self, user: &str, now: DateTime<Utc>) {
        match self {
            Aggregate::Street(s) => {
                for esu in s.esus.iter_mut() {
                    settle_in(&mut esu.highway_dedications, user, now);
                    settle_in(&mut esu.one_way_exemptions, user, now);
                }
                settle_in(&mut s.esus, user, now);
                settle_in(&mut s.descriptors, user, now);
                settle_in(&mut s.maintenance_responsibilities, user, now);
                settle_in(&mut s.reinstatement_categories, user, now);
                settle_in(&mut s.os_special_designations, user, now);
                settle_in(&mut s.interests, user, now);
                settle_in(&mut s.constructions, user, now);
                settle_in(&mut s.special_designations, user, now);
                settle_in(&mut s.hww_restrictions, user, now);
                settle_in(&mut s.public_rights_of_way, user, now);
                settle_in(&mut s.notes, user, now);
                s.stamp.touch(user, now);
                s.version += 1;
                s.new_street = false;
            }
            Aggregate::Property(p) => {
                settle_in(&mut p.lpis, user, now);
                settle_in(&mut p.provenances, user, now);
                settle_in(&mut p.cross_references, user, now);
                settle_in(&mut p.classifications, user, now);
                settle_in(&mut p.organisations, user, now);
                settle_in(&mut p.successor_cross_references, user, now);
                settle_in(&mut p.notes, user, now);
                p.stamp.touch(user, now);
                p.version += 1;
                p.new_property = false;
            }
        }
    }
}

impl From<Street> for Aggregate {
    fn from(street: Street) -> Self {
        Aggregate::Street(street)
    }
}

impl From<Property> for Aggregate {
    fn from(property: Property) -> Self {
        Aggregate::Property(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn street_with_esu() -> Street {
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(1, 100, "High Street", "ENG"));
        let mut esu = Esu::new(55, 100, 1);
        esu.highway_dedications.push(HighwayDedication {
            pk_id: 3,
            esu_id: 55,
            code: 2,
            ..Default::default()
        });
        street.esus.push(esu);
        street
    }

    #[test]
    fn test_sub_record_dispatch() {
        let record = SubRecord::Descriptor(Descriptor::new(4, 100, "Mill Lane", "ENG"));
        assert_eq!(record.record_type(), RecordType::Descriptor);
        assert_eq!(record.aggregate_type(), AggregateType::Street);
        assert_eq!(record.pk_id(), 4);
        assert_eq!(record.esu_id(), None);
        assert!(record.ignore_keys().contains(&"lastUpdated"));
    }

    #[test]
    fn test_find_esu_child_requires_owner() {
        let aggregate = Aggregate::Street(street_with_esu());

        let found = aggregate.find_record(RecordType::HighwayDedication, 3, Some(55));
        assert!(matches!(found, Some(SubRecord::HighwayDedication(ref hd)) if hd.code == 2));

        assert!(aggregate.find_record(RecordType::HighwayDedication, 3, None).is_none());
        assert!(aggregate.find_record(RecordType::HighwayDedication, 3, Some(56)).is_none());
    }

    #[test]
    fn test_record_at_position() {
        let aggregate = Aggregate::Street(street_with_esu());

        let hd = aggregate.record_at(RecordType::HighwayDedication, 0, Some(0));
        assert_eq!(hd.map(|r| r.pk_id()), Some(3));
        assert!(aggregate.record_at(RecordType::HighwayDedication, 0, None).is_none());
        assert!(aggregate.record_at(RecordType::Descriptor, 1, None).is_none());
        assert_eq!(
            aggregate.record_at(RecordType::Descriptor, 0, None).map(|r| r.record_type()),
            Some(RecordType::Descriptor)
        );
    }

    #[test]
    fn test_find_wrong_aggregate_is_none() {
        let aggregate = Aggregate::Street(street_with_esu());
        assert!(aggregate.find_record(RecordType::Lpi, 1, None).is_none());
    }

    #[test]
    fn test_assign_keys_relinks_children() {
        let mut street = Street::blank(9050);
        street.usrn = 200;
        let mut esu = Esu::new(-1, 0, 1);
        esu.highway_dedications.push(HighwayDedication {
            pk_id: -1,
            esu_id: -1,
            code: 4,
            ..Default::default()
        });
        street.esus.push(esu);
        street.descriptors.push(Descriptor::new(-1, 0, "New Road", "ENG"));

        let mut aggregate = Aggregate::Street(street);
        aggregate.assign_keys();

        let street = aggregate.as_street().unwrap();
        assert_eq!(street.esus[0].esu_id, 1);
        assert_eq!(street.esus[0].usrn, 200);
        assert_eq!(street.esus[0].highway_dedications[0].esu_id, 1);
        assert_eq!(street.esus[0].highway_dedications[0].pk_id, 1);
        assert_eq!(street.descriptors[0].pk_id, 1);
        assert_eq!(street.descriptors[0].usrn, 200);
    }

    #[test]
    fn test_settle_drops_deleted_and_clears_markers() {
        let mut street = street_with_esu();
        street.new_street = true;
        let mut gone = Descriptor::new(2, 100, "Old Name", "ENG");
        gone.change_type = ChangeType::Delete;
        street.descriptors.push(gone);
        street.descriptors[0].change_type = ChangeType::Update;

        let mut aggregate = Aggregate::Street(street);
        aggregate.settle("editor", Utc::now());

        let street = aggregate.as_street().unwrap();
        assert_eq!(street.descriptors.len(), 1);
        assert_eq!(street.descriptors[0].change_type, ChangeType::Unchanged);
        assert_eq!(street.descriptors[0].stamp.last_user.as_deref(), Some("editor"));
        assert!(!street.new_street);
        assert_eq!(street.version, 2);
    }
}
