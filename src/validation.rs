// Field-level validation for streets and properties
//
// A representative subset of the GeoPlace / OneScotland rule-set. Failures
// are data: the validator never returns an error and never panics. Each
// failure is attached to a field of one sub-record occurrence so the error
// list can jump to it.

use crate::error_list::ErrorEntry;
use crate::profile::Profile;
use crate::record_type::{AggregateType, RecordType};
use crate::records::*;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

const MAX_DESCRIPTION: usize = 100;
const MAX_PAO_TEXT: usize = 90;
const MAX_NOTE: usize = 4000;
const MAX_NUMBER: i32 = 9999;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub aggregate_type: AggregateType,
    pub entries: BTreeMap<RecordType, Vec<ErrorEntry>>,
}

impl ValidationReport {
    fn new(aggregate_type: AggregateType) -> Self {
        ValidationReport {
            aggregate_type,
            entries: BTreeMap::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.entries.values().all(|e| e.is_empty())
    }

    /// Number of individual messages
    pub fn error_count(&self) -> usize {
        self.entries.values().flatten().map(|e| e.errors.len()).sum()
    }

    pub fn entries_for(&self, record_type: RecordType) -> &[ErrorEntry] {
        self.entries.get(&record_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add a message, merging with an existing entry for the same field
    /// and occurrence
    fn push(&mut self, record_type: RecordType, entry: ErrorEntry) {
        let group = self.entries.entry(record_type).or_default();
        match group
            .iter_mut()
            .find(|e| e.field == entry.field && e.index == entry.index && e.esu_index == entry.esu_index)
        {
            Some(existing) => existing.errors.extend(entry.errors),
            None => group.push(entry),
        }
    }
}

fn live<'a, T: Record>(items: &'a [T]) -> impl Iterator<Item = (usize, &'a T)> + 'a {
    items
        .iter()
        .enumerate()
        .filter(|(_, r)| r.change_type() != ChangeType::Delete)
}

fn dates_in_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    match (start, end) {
        (Some(start), Some(end)) => start <= end,
        _ => true,
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct RecordValidator {
    profile: Profile,
}

impl RecordValidator {
    pub fn new(profile: Profile) -> Self {
        RecordValidator { profile }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn validate(&self, aggregate: &Aggregate) -> ValidationReport {
        let mut report = ValidationReport::new(aggregate.aggregate_type());
        match aggregate {
            Aggregate::Street(street) => self.validate_street(street, &mut report),
            Aggregate::Property(property) => self.validate_property(property, &mut report),
        }

        if report.is_valid() {
            tracing::debug!(key = aggregate.key(), "Validation passed");
        } else {
            tracing::info!(key = aggregate.key(), errors = report.error_count(), "Validation failed");
        }
        report
    }

    /// Records of a type the authority does not hold
    fn check_supported<T: Record>(&self, items: &[T], report: &mut ValidationReport) {
        if self.profile.supports(T::RECORD_TYPE) {
            return;
        }
        for (i, _) in live(items) {
            report.push(
                T::RECORD_TYPE,
                ErrorEntry::new(
                    "recordType",
                    &format!(
                        "{} records are not held by {} authorities",
                        T::RECORD_TYPE.title(),
                        self.profile.jurisdiction.as_str()
                    ),
                )
                .at(i),
            );
        }
    }

    fn check_language(&self, record_type: RecordType, language: &str, index: usize, report: &mut ValidationReport) {
        if !self.profile.languages().contains(&language) {
            report.push(
                record_type,
                ErrorEntry::new("language", &format!("Language must be one of {}", self.profile.languages().join("¬ "))).at(index),
            );
        }
    }

    fn check_note(record_type: RecordType, note: &str, index: usize, report: &mut ValidationReport) {
        if note.trim().is_empty() {
            report.push(record_type, ErrorEntry::new("note", "Note is required").at(index));
        } else if note.chars().count() > MAX_NOTE {
            report.push(
                record_type,
                ErrorEntry::new("note", &format!("Note must be at most {} characters", MAX_NOTE)).at(index),
            );
        }
    }

    // ------------------------------------------------------------------------
    // Street
    // ------------------------------------------------------------------------

    fn validate_street(&self, street: &Street, report: &mut ValidationReport) {
        // Rule 1: USRN assigned (new streets get one on save)
        if street.usrn <= 0 && !street.new_street {
            report.push(RecordType::Street, ErrorEntry::new("usrn", "USRN is required"));
        }

        // Rule 2: Street record type
        let valid_type = matches!(street.record_type, 1..=4) || (self.profile.is_scottish() && street.record_type == 9);
        if !valid_type {
            report.push(
                RecordType::Street,
                ErrorEntry::new("recordType", "Record type must be 1¬ 2¬ 3 or 4"),
            );
        }

        if !dates_in_order(street.start_date, street.end_date) {
            report.push(
                RecordType::Street,
                ErrorEntry::new("endDate", "End date must not be before the start date"),
            );
        }

        // Rule 3: Descriptors
        let live_descriptors: Vec<_> = live(&street.descriptors).collect();
        if live_descriptors.is_empty() {
            report.push(
                RecordType::Descriptor,
                ErrorEntry::new("description", "A street must have at least one descriptor"),
            );
        }
        if self.profile.is_welsh() {
            for language in ["ENG", "CYM"] {
                if !live_descriptors.iter().any(|(_, d)| d.language == language) {
                    report.push(
                        RecordType::Descriptor,
                        ErrorEntry::new("language", &format!("A {} descriptor is required", language)),
                    );
                }
            }
        }
        for (i, descriptor) in live_descriptors {
            self.validate_descriptor(street, descriptor, i, report);
        }

        // Rule 4: ESUs and their children
        for (i, esu) in live(&street.esus) {
            if !(1..=3).contains(&esu.direction) {
                report.push(RecordType::Esu, ErrorEntry::new("direction", "Direction must be 1¬ 2 or 3").at(i));
            }
            if self.profile.is_scottish() && esu.state.is_none() {
                report.push(RecordType::Esu, ErrorEntry::new("state", "State is required").at(i));
            }
            for (j, hd) in live(&esu.highway_dedications) {
                if !dates_in_order(hd.start_date, hd.end_date) {
                    report.push(
                        RecordType::HighwayDedication,
                        ErrorEntry::new("endDate", "End date must not be before the start date").at(j).in_esu(i),
                    );
                }
                if hd.start_time.is_some() != hd.end_time.is_some() {
                    report.push(
                        RecordType::HighwayDedication,
                        ErrorEntry::new("endTime", "Start and end times must be given together").at(j).in_esu(i),
                    );
                }
            }
            for (j, owe) in live(&esu.one_way_exemptions) {
                if !dates_in_order(owe.start_date, owe.end_date) {
                    report.push(
                        RecordType::OneWayExemption,
                        ErrorEntry::new("endDate", "End date must not be before the start date").at(j).in_esu(i),
                    );
                }
            }
        }

        // Rule 5: Regime-specific records
        self.check_supported(&street.maintenance_responsibilities, report);
        self.check_supported(&street.reinstatement_categories, report);
        self.check_supported(&street.os_special_designations, report);
        self.check_supported(&street.interests, report);
        self.check_supported(&street.constructions, report);
        self.check_supported(&street.special_designations, report);
        self.check_supported(&street.hww_restrictions, report);
        self.check_supported(&street.public_rights_of_way, report);

        for (i, hww) in live(&street.hww_restrictions) {
            if hww.value_metric <= 0.0 {
                report.push(
                    RecordType::HwwRestriction,
                    ErrorEntry::new("valueMetric", "Restriction value must be greater than zero").at(i),
                );
            }
        }
        for (i, prow) in live(&street.public_rights_of_way) {
            if prow.prow_status.trim().is_empty() {
                report.push(RecordType::PublicRightOfWay, ErrorEntry::new("prowStatus", "Status is required").at(i));
            }
            if !dates_in_order(prow.start_date, prow.end_date) {
                report.push(
                    RecordType::PublicRightOfWay,
                    ErrorEntry::new("endDate", "End date must not be before the start date").at(i),
                );
            }
        }

        // Rule 6: Notes
        for (i, note) in live(&street.notes) {
            Self::check_note(RecordType::StreetNote, &note.note, i, report);
        }
    }

    fn validate_descriptor(&self, street: &Street, descriptor: &Descriptor, index: usize, report: &mut ValidationReport) {
        let description = descriptor.description.as_str();
        if description.trim().is_empty() {
            report.push(RecordType::Descriptor, ErrorEntry::new("description", "Description is required").at(index));
        } else {
            if description.chars().count() > MAX_DESCRIPTION {
                report.push(
                    RecordType::Descriptor,
                    ErrorEntry::new(
                        "description",
                        &format!("Description must be at most {} characters", MAX_DESCRIPTION),
                    )
                    .at(index),
                );
            }
            if description.trim() != description {
                report.push(
                    RecordType::Descriptor,
                    ErrorEntry::new("description", "Description must not start or end with a space").at(index),
                );
            }
        }

        self.check_language(RecordType::Descriptor, &descriptor.language, index, report);

        if matches!(street.record_type, 1 | 2) && descriptor.town_ref.is_none() {
            report.push(RecordType::Descriptor, ErrorEntry::new("townRef", "Town is required").at(index));
        }
    }

    // ------------------------------------------------------------------------
    // Property
    // ------------------------------------------------------------------------

    fn validate_property(&self, property: &Property, report: &mut ValidationReport) {
        // Rule 1: UPRN assigned (new properties get one on save)
        if property.uprn <= 0 && !property.new_property {
            report.push(RecordType::Property, ErrorEntry::new("uprn", "UPRN is required"));
        }

        // Rule 2: Logical status
        if !matches!(property.logical_status, 1 | 3 | 6 | 8) {
            report.push(
                RecordType::Property,
                ErrorEntry::new("logicalStatus", "Logical status must be 1¬ 3¬ 6 or 8"),
            );
        }
        if self.profile.is_scottish() && property.logical_status == 1 && property.blpu_state.is_none() {
            report.push(
                RecordType::Property,
                ErrorEntry::new("blpuState", "BLPU state is required for approved properties"),
            );
        }
        if !dates_in_order(property.start_date, property.end_date) {
            report.push(
                RecordType::Property,
                ErrorEntry::new("endDate", "End date must not be before the start date"),
            );
        }

        // Rule 3: LPIs
        let live_lpis: Vec<_> = live(&property.lpis).collect();
        if live_lpis.is_empty() {
            report.push(RecordType::Lpi, ErrorEntry::new("paoText", "A property must have at least one LPI"));
        }
        for (i, lpi) in live_lpis {
            self.validate_lpi(lpi, i, report);
        }

        // Rule 4: Classification (GeoPlace only)
        if !self.profile.is_scottish() && live(&property.classifications).next().is_none() {
            report.push(
                RecordType::Classification,
                ErrorEntry::new("blpuClass", "A property must have at least one classification"),
            );
        }
        for (i, classification) in live(&property.classifications) {
            if classification.blpu_class.trim().is_empty() {
                report.push(
                    RecordType::Classification,
                    ErrorEntry::new("blpuClass", "Classification is required").at(i),
                );
            }
        }

        for (i, xref) in live(&property.cross_references) {
            if xref.cross_reference.trim().is_empty() {
                report.push(
                    RecordType::CrossReference,
                    ErrorEntry::new("crossReference", "Cross reference is required").at(i),
                );
            }
        }
        for (i, org) in live(&property.organisations) {
            if org.organisation.trim().is_empty() {
                report.push(
                    RecordType::Organisation,
                    ErrorEntry::new("organisation", "Organisation name is required").at(i),
                );
            }
        }

        // Rule 5: Notes
        for (i, note) in live(&property.notes) {
            Self::check_note(RecordType::PropertyNote, &note.note, i, report);
        }
    }

    fn validate_lpi(&self, lpi: &Lpi, index: usize, report: &mut ValidationReport) {
        let pao_text = lpi.pao_text.as_deref().map(str::trim).unwrap_or("");
        if pao_text.is_empty() && lpi.pao_start_number.is_none() {
            report.push(
                RecordType::Lpi,
                ErrorEntry::new("paoText", "PAO text or PAO start number is required").at(index),
            );
        }
        if pao_text.chars().count() > MAX_PAO_TEXT {
            report.push(
                RecordType::Lpi,
                ErrorEntry::new("paoText", &format!("PAO text must be at most {} characters", MAX_PAO_TEXT)).at(index),
            );
        }
        if lpi.pao_start_number.is_some_and(|n| !(0..=MAX_NUMBER).contains(&n)) {
            report.push(
                RecordType::Lpi,
                ErrorEntry::new("paoStartNumber", &format!("PAO start number must be between 0 and {}", MAX_NUMBER)).at(index),
            );
        }
        if lpi.pao_end_number.is_some() && lpi.pao_start_number.is_none() {
            report.push(
                RecordType::Lpi,
                ErrorEntry::new("paoEndNumber", "PAO end number requires a start number").at(index),
            );
        }
        if lpi.usrn <= 0 {
            report.push(RecordType::Lpi, ErrorEntry::new("usrn", "Street is required").at(index));
        }
        self.check_language(RecordType::Lpi, &lpi.language, index, report);
    }
}
