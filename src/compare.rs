// Change detection
//
// Decides whether an edited record differs from what was last persisted.
// Records are compared as JSON values after dropping the keys the record type
// ignores (timestamps, last-updated-by, version counters). Equality is
// strict: no tolerance on numbers or dates.

use crate::record_type::{AggregateType, RecordType};
use crate::records::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What is being checked against the source aggregate
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// The whole working copy (record types 11 and 21)
    Aggregate(&'a Aggregate),
    /// A single sub-record open in a form
    Record(&'a SubRecord),
}

impl Candidate<'_> {
    pub fn record_type(&self) -> RecordType {
        match self {
            Candidate::Aggregate(a) => a.aggregate_type().root(),
            Candidate::Record(r) => r.record_type(),
        }
    }

    pub fn ignore_keys(&self) -> &'static [&'static str] {
        match self {
            Candidate::Aggregate(a) => a.root_ignore_keys(),
            Candidate::Record(r) => r.ignore_keys(),
        }
    }
}

// ============================================================================
// KEY STRIPPING
// ============================================================================

fn strip_keys(value: &mut Value, keys: &[&str]) {
    if let Value::Object(map) = value {
        for key in keys {
            map.remove(*key);
        }
    }
}

fn strip_keys_deep(value: &mut Value, keys: &[&str]) {
    match value {
        Value::Object(map) => {
            for key in keys {
                map.remove(*key);
            }
            for child in map.values_mut() {
                strip_keys_deep(child, keys);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_keys_deep(item, keys);
            }
        }
        _ => {}
    }
}

/// Any nested record marked for deletion? Markers are stripped before
/// comparison, so deletions are detected separately.
fn has_deletions(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.get("changeType").and_then(Value::as_str) == Some("D") || map.values().any(has_deletions)
        }
        Value::Array(items) => items.iter().any(has_deletions),
        _ => false,
    }
}

/// Ignore list for a record type
pub fn ignore_keys_for(record_type: RecordType) -> &'static [&'static str] {
    match record_type {
        RecordType::Street => street::STREET_IGNORE_KEYS,
        RecordType::Property => property::PROPERTY_IGNORE_KEYS,
        RecordType::Esu => Esu::IGNORE_KEYS,
        RecordType::Lpi => Lpi::IGNORE_KEYS,
        _ => VOLATILE_KEYS,
    }
}

// ============================================================================
// PREDICATES
// ============================================================================

/// Has the candidate materially changed from its persisted counterpart?
///
/// A new aggregate is always changed. A sub-record missing from the source,
/// or marked for deletion, is changed.
pub fn has_changed(source: &Aggregate, candidate: Candidate<'_>) -> bool {
    has_changed_ignoring(source, candidate, candidate.ignore_keys())
}

/// As `has_changed`, with an explicit ignore list
pub fn has_changed_ignoring(source: &Aggregate, candidate: Candidate<'_>, ignore_keys: &[&str]) -> bool {
    if source.is_new() {
        return true;
    }

    let changed = match candidate {
        Candidate::Aggregate(current) => {
            if current.is_new() || current.aggregate_type() != source.aggregate_type() {
                return true;
            }
            let before = source.to_value();
            let after = current.to_value();
            if has_deletions(&after) {
                return true;
            }
            collections_differ(&before, &after, current.aggregate_type(), ignore_keys)
        }
        Candidate::Record(record) => {
            if record.aggregate_type() != source.aggregate_type() {
                tracing::warn!(
                    record_type = record.record_type().code(),
                    aggregate = %source.aggregate_type(),
                    "Comparing a sub-record against the wrong aggregate"
                );
                return true;
            }
            if record.change_type() == ChangeType::Delete {
                return true;
            }
            match source.find_record(record.record_type(), record.pk_id(), record.esu_id()) {
                None => true,
                Some(original) => {
                    let mut before = original.to_value();
                    let mut after = record.to_value();
                    strip_keys(&mut before, ignore_keys);
                    strip_keys(&mut after, ignore_keys);
                    before != after
                }
            }
        }
    };

    tracing::debug!(
        record_type = candidate.record_type().code(),
        key = source.key(),
        changed,
        "Change check"
    );
    changed
}

/// Whole-aggregate comparison (record types 11 and 21)
pub fn aggregate_changed(source: &Aggregate, current: &Aggregate) -> bool {
    has_changed(source, Candidate::Aggregate(current))
}

// ============================================================================
// ASSOCIATED RECORDS
// ============================================================================

fn collection_key(record_type: RecordType) -> Option<&'static str> {
    let key = match record_type {
        RecordType::Descriptor => "descriptors",
        RecordType::Esu => "esus",
        RecordType::MaintenanceResponsibility => "maintenanceResponsibilities",
        RecordType::ReinstatementCategory => "reinstatementCategories",
        RecordType::OsSpecialDesignation => "osSpecialDesignations",
        RecordType::Interest => "interests",
        RecordType::Construction => "constructions",
        RecordType::SpecialDesignation => "specialDesignations",
        RecordType::HwwRestriction => "hwwRestrictions",
        RecordType::PublicRightOfWay => "publicRightsOfWay",
        RecordType::StreetNote | RecordType::PropertyNote => "notes",
        RecordType::Lpi => "lpis",
        RecordType::Provenance => "provenances",
        RecordType::CrossReference => "crossReferences",
        RecordType::Classification => "classifications",
        RecordType::Organisation => "organisations",
        RecordType::SuccessorCrossReference => "successorCrossReferences",
        RecordType::HighwayDedication => "highwayDedications",
        RecordType::OneWayExemption => "oneWayExemptions",
        RecordType::Street | RecordType::Property => return None,
    };
    Some(key)
}

fn records_of(root: &Value, record_type: RecordType) -> Vec<Value> {
    let key = match collection_key(record_type) {
        Some(key) => key,
        None => return Vec::new(),
    };

    if record_type.is_esu_child() {
        root.get("esus")
            .and_then(Value::as_array)
            .map(|esus| {
                esus.iter()
                    .filter_map(|esu| esu.get(key).and_then(Value::as_array))
                    .flatten()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    } else {
        root.get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

fn keyed(records: Vec<Value>, ignore_keys: &[&str]) -> (BTreeMap<(i64, i64), Value>, bool) {
    let mut map = BTreeMap::new();
    let mut deleted = false;
    for mut record in records {
        deleted |= record.get("changeType").and_then(Value::as_str) == Some("D");
        let pk = record
            .get("pkId")
            .or_else(|| record.get("esuId"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let owner = record.get("esuId").and_then(Value::as_i64).unwrap_or(0);
        strip_keys_deep(&mut record, ignore_keys);
        map.insert((owner, pk), record);
    }
    (map, deleted)
}

fn root_fields(value: &Value, ignore_keys: &[&str]) -> Value {
    let mut root = Map::new();
    if let Value::Object(map) = value {
        for (k, v) in map {
            if v.is_array() || ignore_keys.contains(&k.as_str()) {
                continue;
            }
            root.insert(k.clone(), v.clone());
        }
    }
    Value::Object(root)
}

/// Root fields, then each collection matched by key. Element order is not
/// significant: reconciling an ESU child moves the owning ESU to the end.
fn collections_differ(before: &Value, after: &Value, aggregate_type: AggregateType, ignore_keys: &[&str]) -> bool {
    if root_fields(before, ignore_keys) != root_fields(after, ignore_keys) {
        return true;
    }
    RecordType::ALL
        .iter()
        .filter(|rt| rt.aggregate() == aggregate_type && !rt.is_root())
        .any(|&record_type| {
            let old = records_of(before, record_type);
            let new = records_of(after, record_type);
            old.len() != new.len() || keyed(old, ignore_keys).0 != keyed(new, ignore_keys).0
        })
}

/// Every record type whose data differs between source and working copy,
/// in code order. Used to build the "these records have changed" prompt.
pub fn changed_record_types(source: &Aggregate, current: &Aggregate) -> Vec<RecordType> {
    if source.aggregate_type() != current.aggregate_type() {
        return vec![current.aggregate_type().root()];
    }

    let aggregate_type = current.aggregate_type();
    let before = source.to_value();
    let after = current.to_value();
    let mut changed = Vec::new();

    for record_type in RecordType::ALL {
        if record_type.aggregate() != aggregate_type {
            continue;
        }
        let ignore = ignore_keys_for(record_type);
        if record_type.is_root() {
            if root_fields(&before, ignore) != root_fields(&after, ignore) {
                changed.push(record_type);
            }
            continue;
        }
        let (old, _) = keyed(records_of(&before, record_type), ignore);
        let (new, deleted) = keyed(records_of(&after, record_type), ignore);
        if deleted || old != new {
            changed.push(record_type);
        }
    }

    changed
}

/// Display names of changed record types, deduplicated, for the prompt
pub fn associated_record_names(source: &Aggregate, current: &Aggregate) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record_type in changed_record_types(source, current) {
        let name = record_type.display_name().to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Has any LPI's primary addressable object changed? Drives the offer to
/// cascade PAO details to child properties.
pub fn pao_changed(source: &Aggregate, current: &Aggregate) -> bool {
    let (source, current) = match (source.as_property(), current.as_property()) {
        (Some(s), Some(c)) => (s, c),
        _ => return false,
    };
    current.lpis.iter().any(|lpi| {
        source
            .lpis
            .iter()
            .find(|old| old.pk_id == lpi.pk_id)
            .map(|old| old.pao() != lpi.pao())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn high_street() -> Street {
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(1, 100, "High St", "ENG"));
        let mut esu = Esu::new(55, 100, 1);
        esu.highway_dedications.push(HighwayDedication {
            pk_id: 3,
            esu_id: 55,
            code: 2,
            ..Default::default()
        });
        street.esus.push(esu);
        street.notes.push(StreetNote {
            pk_id: 1,
            usrn: 100,
            seq_num: 1,
            note: "Adopted 1998".to_string(),
            ..Default::default()
        });
        street
    }

    fn mill_house() -> Property {
        let mut property = Property::new(10, 1, 9050);
        let mut lpi = Lpi::new(1, 10, 100, "ENG");
        lpi.pao_start_number = Some(14);
        lpi.pao_text = Some("Mill House".to_string());
        property.lpis.push(lpi);
        property
    }

    #[test]
    fn test_unchanged_descriptor_ignores_stamps() {
        let source = Aggregate::Street(high_street());
        let mut descriptor = high_street().descriptors[0].clone();
        descriptor.stamp.last_user = Some("someone".to_string());
        descriptor.stamp.last_updated = Some(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
        descriptor.change_type = ChangeType::Update;

        assert!(!has_changed(&source, Candidate::Record(&SubRecord::Descriptor(descriptor))));
    }

    #[test]
    fn test_changed_descriptor() {
        let source = Aggregate::Street(high_street());
        let mut descriptor = high_street().descriptors[0].clone();
        descriptor.description = "High Street".to_string();

        assert!(has_changed(&source, Candidate::Record(&SubRecord::Descriptor(descriptor))));
    }

    #[test]
    fn test_new_sub_record_is_changed() {
        let source = Aggregate::Street(high_street());
        let note = StreetNote {
            pk_id: -1,
            usrn: 100,
            seq_num: 2,
            note: "Resurfaced".to_string(),
            ..Default::default()
        };
        assert!(has_changed(&source, Candidate::Record(&SubRecord::StreetNote(note))));
    }

    #[test]
    fn test_deleted_sub_record_is_changed() {
        let source = Aggregate::Street(high_street());
        let mut note = high_street().notes[0].clone();
        note.change_type = ChangeType::Delete;
        assert!(has_changed(&source, Candidate::Record(&SubRecord::StreetNote(note))));
    }

    #[test]
    fn test_esu_child_located_through_owner() {
        let source = Aggregate::Street(high_street());
        let mut hd = high_street().esus[0].highway_dedications[0].clone();
        assert!(!has_changed(&source, Candidate::Record(&SubRecord::HighwayDedication(hd.clone()))));

        hd.code = 4;
        assert!(has_changed(&source, Candidate::Record(&SubRecord::HighwayDedication(hd.clone()))));

        // Same key under a different ESU has no source counterpart
        hd.code = 2;
        hd.esu_id = 56;
        assert!(has_changed(&source, Candidate::Record(&SubRecord::HighwayDedication(hd))));
    }

    #[test]
    fn test_esu_form_ignores_children() {
        let source = Aggregate::Street(high_street());
        let mut esu = high_street().esus[0].clone();
        esu.highway_dedications.clear();
        esu.esu_version = 7;

        assert!(!has_changed(&source, Candidate::Record(&SubRecord::Esu(esu))));
    }

    #[test]
    fn test_new_aggregate_always_changed() {
        let blank = Aggregate::Street(Street::blank(9050));
        assert!(has_changed(&blank, Candidate::Aggregate(&blank)));

        let mut empty_property = Property::blank(9050);
        empty_property.new_property = true;
        let aggregate = Aggregate::Property(empty_property);
        assert!(aggregate_changed(&aggregate, &aggregate));
    }

    #[test]
    fn test_whole_aggregate_ignores_nested_volatile_keys() {
        let source = Aggregate::Street(high_street());
        let mut current = high_street();
        current.version = 9;
        current.stamp.last_user = Some("editor".to_string());
        current.esus[0].highway_dedications[0].stamp.last_user = Some("editor".to_string());
        current.esus[0].esu_version = 3;

        assert!(!aggregate_changed(&source, &Aggregate::Street(current.clone())));

        current.esus[0].highway_dedications[0].code = 4;
        assert!(aggregate_changed(&source, &Aggregate::Street(current)));
    }

    #[test]
    fn test_whole_aggregate_ignores_collection_order() {
        let mut two_esus = high_street();
        two_esus.esus.push(Esu::new(56, 100, 1));
        let source = Aggregate::Street(two_esus.clone());

        let mut current = two_esus;
        current.esus.rotate_left(1);
        assert!(!aggregate_changed(&source, &Aggregate::Street(current.clone())));

        current.esus.pop();
        assert!(aggregate_changed(&source, &Aggregate::Street(current)));
    }

    #[test]
    fn test_pending_delete_changes_aggregate() {
        let source = Aggregate::Street(high_street());
        let mut current = high_street();
        current.notes[0].change_type = ChangeType::Delete;

        assert!(aggregate_changed(&source, &Aggregate::Street(current)));
    }

    #[test]
    fn test_numeric_comparison_is_strict() {
        let mut source = Property::new(10, 1, 9050);
        source.x_coordinate = 530000.0;
        let mut current = source.clone();
        current.x_coordinate = 530000.0001;

        assert!(aggregate_changed(
            &Aggregate::Property(source),
            &Aggregate::Property(current)
        ));
    }

    #[test]
    fn test_changed_record_types() {
        let source = Aggregate::Street(high_street());
        let mut current = high_street();
        current.descriptors[0].description = "High Street".to_string();
        current.esus[0].highway_dedications[0].code = 4;

        let changed = changed_record_types(&source, &Aggregate::Street(current));
        assert_eq!(changed, vec![RecordType::Descriptor, RecordType::HighwayDedication]);
    }

    #[test]
    fn test_changed_root_fields_only() {
        let source = Aggregate::Street(high_street());
        let mut current = high_street();
        current.state = Some(2);
        current.version = 5;

        let changed = changed_record_types(&source, &Aggregate::Street(current));
        assert_eq!(changed, vec![RecordType::Street]);
    }

    #[test]
    fn test_associated_names_for_simple_edit() {
        let source = Aggregate::Street(high_street());
        let mut current = high_street();
        current.descriptors[0].description = "High Street".to_string();

        assert_eq!(
            associated_record_names(&source, &Aggregate::Street(current)),
            vec!["descriptor".to_string()]
        );
    }

    #[test]
    fn test_pao_changed() {
        let source = Aggregate::Property(mill_house());
        let mut current = mill_house();
        current.lpis[0].sao_text = Some("Flat 1".to_string());
        assert!(!pao_changed(&source, &Aggregate::Property(current.clone())));

        current.lpis[0].pao_start_number = Some(16);
        assert!(pao_changed(&source, &Aggregate::Property(current)));

        let street = Aggregate::Street(high_street());
        assert!(!pao_changed(&street, &street));
    }
}
