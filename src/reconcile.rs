// Sandbox reconciliation
//
// "Keep changes": splice an edited sub-record back into its aggregate.
// Replace-by-key-or-append on the owning collection; every other collection
// passes through untouched. ESU children are written by replacing the whole
// owning ESU: it is taken out of the ESU list, its child list is merged, and
// it is appended again.

use crate::records::*;

/// Replace the element with the same key, or append when none matches
pub fn replace_or_append<T: Record>(items: &mut Vec<T>, record: T) {
    match items.iter().position(|r| r.pk_id() == record.pk_id()) {
        Some(pos) => items[pos] = record,
        None => items.push(record),
    }
}

fn with_owning_esu<F>(street: &mut Street, esu_id: i64, merge: F) -> bool
where
    F: FnOnce(&mut Esu),
{
    let pos = match street.esus.iter().position(|e| e.esu_id == esu_id) {
        Some(pos) => pos,
        None => {
            tracing::warn!(usrn = street.usrn, esu_id, "Owning ESU not found; child not reconciled");
            return false;
        }
    };

    let mut esu = street.esus.remove(pos);
    merge(&mut esu);
    street.esus.push(esu);
    true
}

fn mark_edited(record: &mut SubRecord) {
    if record.change_type() == ChangeType::Unchanged {
        let marker = if record.is_new() {
            ChangeType::Insert
        } else {
            ChangeType::Update
        };
        record.set_change_type(marker);
    }
}

/// Apply an edited sub-record to the aggregate in place.
///
/// Returns false, leaving the aggregate untouched, when the record belongs
/// to the other aggregate kind or its owning ESU is missing.
pub fn apply(aggregate: &mut Aggregate, mut record: SubRecord) -> bool {
    if record.aggregate_type() != aggregate.aggregate_type() {
        tracing::warn!(
            record_type = record.record_type().code(),
            aggregate = %aggregate.aggregate_type(),
            "Sub-record does not belong to this aggregate"
        );
        return false;
    }
    mark_edited(&mut record);

    match (aggregate, record) {
        (Aggregate::Street(s), SubRecord::Descriptor(r)) => replace_or_append(&mut s.descriptors, r),
        (Aggregate::Street(s), SubRecord::Esu(r)) => replace_or_append(&mut s.esus, r),
        (Aggregate::Street(s), SubRecord::HighwayDedication(r)) => {
            return with_owning_esu(s, r.esu_id, |esu| replace_or_append(&mut esu.highway_dedications, r));
        }
        (Aggregate::Street(s), SubRecord::OneWayExemption(r)) => {
            return with_owning_esu(s, r.esu_id, |esu| replace_or_append(&mut esu.one_way_exemptions, r));
        }
        (Aggregate::Street(s), SubRecord::MaintenanceResponsibility(r)) => {
            replace_or_append(&mut s.maintenance_responsibilities, r)
        }
        (Aggregate::Street(s), SubRecord::ReinstatementCategory(r)) => {
            replace_or_append(&mut s.reinstatement_categories, r)
        }
        (Aggregate::Street(s), SubRecord::OsSpecialDesignation(r)) => {
            replace_or_append(&mut s.os_special_designations, r)
        }
        (Aggregate::Street(s), SubRecord::Interest(r)) => replace_or_append(&mut s.interests, r),
        (Aggregate::Street(s), SubRecord::Construction(r)) => replace_or_append(&mut s.constructions, r),
        (Aggregate::Street(s), SubRecord::SpecialDesignation(r)) => {
            replace_or_append(&mut s.special_designations, r)
        }
        (Aggregate::Street(s), SubRecord::HwwRestriction(r)) => replace_or_append(&mut s.hww_restrictions, r),
        (Aggregate::Street(s), SubRecord::PublicRightOfWay(r)) => {
            replace_or_append(&mut s.public_rights_of_way, r)
        }
        (Aggregate::Street(s), SubRecord::StreetNote(r)) => replace_or_append(&mut s.notes, r),
        (Aggregate::Property(p), SubRecord::Lpi(r)) => replace_or_append(&mut p.lpis, r),
        (Aggregate::Property(p), SubRecord::Provenance(r)) => replace_or_append(&mut p.provenances, r),
        (Aggregate::Property(p), SubRecord::CrossReference(r)) => replace_or_append(&mut p.cross_references, r),
        (Aggregate::Property(p), SubRecord::Classification(r)) => replace_or_append(&mut p.classifications, r),
        (Aggregate::Property(p), SubRecord::Organisation(r)) => replace_or_append(&mut p.organisations, r),
        (Aggregate::Property(p), SubRecord::SuccessorCrossReference(r)) => {
            replace_or_append(&mut p.successor_cross_references, r)
        }
        (Aggregate::Property(p), SubRecord::PropertyNote(r)) => replace_or_append(&mut p.notes, r),
        // Kinds were checked above
        _ => return false,
    }
    true
}

/// Return the aggregate with the sandboxed record spliced in. A missing
/// sandboxed record is a no-op.
pub fn reconcile(aggregate: &Aggregate, sandboxed: Option<&SubRecord>) -> Aggregate {
    let mut updated = aggregate.clone();
    if let Some(record) = sandboxed {
        apply(&mut updated, record.clone());
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn street() -> Street {
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(1, 100, "High St", "ENG"));
        street.descriptors.push(Descriptor::new(2, 100, "Stryd Fawr", "CYM"));
        let mut first = Esu::new(55, 100, 1);
        first.highway_dedications.push(HighwayDedication {
            pk_id: 3,
            esu_id: 55,
            code: 2,
            ..Default::default()
        });
        street.esus.push(first);
        street.esus.push(Esu::new(56, 100, 2));
        street.notes.push(StreetNote {
            pk_id: 1,
            usrn: 100,
            seq_num: 1,
            note: "Adopted".to_string(),
            ..Default::default()
        });
        street
    }

    #[test]
    fn test_replace_keeps_position() {
        let aggregate = Aggregate::Street(street());
        let mut edited = Descriptor::new(1, 100, "High Street", "ENG");
        edited.locality_ref = Some(7);

        let updated = reconcile(&aggregate, Some(&SubRecord::Descriptor(edited)));
        let s = updated.as_street().unwrap();

        assert_eq!(s.descriptors.len(), 2);
        assert_eq!(s.descriptors[0].description, "High Street");
        assert_eq!(s.descriptors[0].change_type, ChangeType::Update);
        assert_eq!(s.descriptors[1].description, "Stryd Fawr");
    }

    #[test]
    fn test_new_record_appended_as_insert() {
        let aggregate = Aggregate::Street(street());
        let note = StreetNote {
            pk_id: -1,
            usrn: 100,
            seq_num: 2,
            note: "Resurfaced".to_string(),
            ..Default::default()
        };

        let updated = reconcile(&aggregate, Some(&SubRecord::StreetNote(note)));
        let notes = &updated.as_street().unwrap().notes;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].change_type, ChangeType::Insert);
    }

    #[test]
    fn test_siblings_untouched() {
        let original = street();
        let aggregate = Aggregate::Street(original.clone());
        let edited = Descriptor::new(1, 100, "High Street", "ENG");

        let updated = reconcile(&aggregate, Some(&SubRecord::Descriptor(edited)));
        let s = updated.as_street().unwrap();

        assert_eq!(s.esus, original.esus);
        assert_eq!(s.notes, original.notes);
        assert_eq!(s.interests, original.interests);
        assert_eq!(s.usrn, original.usrn);
        assert_eq!(s.state, original.state);
    }

    #[test]
    fn test_esu_child_reappends_owner() {
        let aggregate = Aggregate::Street(street());
        let edited = HighwayDedication {
            pk_id: 3,
            esu_id: 55,
            code: 4,
            ..Default::default()
        };

        let updated = reconcile(&aggregate, Some(&SubRecord::HighwayDedication(edited)));
        let s = updated.as_street().unwrap();

        assert_eq!(s.esus.len(), 2);
        assert_eq!(s.esus[0].esu_id, 56);
        assert_eq!(s.esus[1].esu_id, 55);
        assert_eq!(s.esus[1].highway_dedications.len(), 1);
        assert_eq!(s.esus[1].highway_dedications[0].code, 4);
        assert_eq!(s.descriptors, street().descriptors);
    }

    #[test]
    fn test_esu_child_with_missing_owner_is_noop() {
        let aggregate = Aggregate::Street(street());
        let orphan = OneWayExemption {
            pk_id: -1,
            esu_id: 99,
            exemption_type: 1,
            ..Default::default()
        };

        let updated = reconcile(&aggregate, Some(&SubRecord::OneWayExemption(orphan)));
        assert_eq!(updated, aggregate);
    }

    #[test]
    fn test_none_is_noop() {
        let aggregate = Aggregate::Street(street());
        assert_eq!(reconcile(&aggregate, None), aggregate);
    }

    #[test]
    fn test_wrong_aggregate_is_noop() {
        let aggregate = Aggregate::Street(street());
        let lpi = Lpi::new(1, 10, 100, "ENG");

        let mut target = aggregate.clone();
        assert!(!apply(&mut target, SubRecord::Lpi(lpi)));
        assert_eq!(target, aggregate);
    }

    #[test]
    fn test_property_sibling_collections_preserved() {
        let mut property = Property::new(10, 1, 9050);
        property.lpis.push(Lpi::new(1, 10, 100, "ENG"));
        property.classifications.push(Classification {
            pk_id: 1,
            uprn: 10,
            class_scheme: "AddressBase Premium Classification Scheme".to_string(),
            blpu_class: "RD04".to_string(),
            ..Default::default()
        });
        let aggregate = Aggregate::Property(property.clone());

        let org = Organisation {
            pk_id: -1,
            uprn: 10,
            organisation: "Mill Bakery".to_string(),
            ..Default::default()
        };
        let updated = reconcile(&aggregate, Some(&SubRecord::Organisation(org)));
        let p = updated.as_property().unwrap();

        assert_eq!(p.organisations.len(), 1);
        assert_eq!(p.lpis, property.lpis);
        assert_eq!(p.classifications, property.classifications);
    }
}
