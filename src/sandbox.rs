// Edit session
//
// Holds the aggregate being edited: the copy last loaded from the store
// (source), the working copy with kept edits (current), and the sub-record
// open in a form (pending). Only one aggregate is active at a time; opening
// another replaces the session.

use crate::compare::{self, Candidate};
use crate::reconcile;
use crate::record_type::RecordType;
use crate::records::{Aggregate, SubRecord};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EditSession {
    id: Uuid,
    source: Option<Aggregate>,
    current: Option<Aggregate>,
    pending: Option<SubRecord>,
    focus: RecordType,
    modified: bool,
    last_good: Option<Aggregate>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        EditSession {
            id: Uuid::new_v4(),
            source: None,
            current: None,
            pending: None,
            focus: RecordType::Street,
            modified: false,
            last_good: None,
        }
    }

    /// Start editing a persisted aggregate
    pub fn open(&mut self, aggregate: Aggregate) {
        self.id = Uuid::new_v4();
        self.focus = aggregate.aggregate_type().root();
        self.source = Some(aggregate.clone());
        self.last_good = Some(aggregate.clone());
        self.current = Some(aggregate);
        self.pending = None;
        self.modified = false;
        tracing::debug!(session = %self.id, focus = %self.focus, "Edit session opened");
    }

    /// Start editing a never-saved aggregate. It counts as changed until saved.
    pub fn start_new(&mut self, aggregate: Aggregate) {
        self.id = Uuid::new_v4();
        self.focus = aggregate.aggregate_type().root();
        self.source = Some(aggregate.clone());
        self.current = Some(aggregate);
        self.pending = None;
        self.modified = true;
        tracing::debug!(session = %self.id, focus = %self.focus, "New aggregate session");
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> Option<&Aggregate> {
        self.source.as_ref()
    }

    pub fn current(&self) -> Option<&Aggregate> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&SubRecord> {
        self.pending.as_ref()
    }

    pub fn focus(&self) -> RecordType {
        self.focus
    }

    pub fn set_focus(&mut self, focus: RecordType) {
        self.focus = focus;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Snapshot of the last aggregate loaded or saved successfully
    pub fn last_good(&self) -> Option<&Aggregate> {
        self.last_good.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Edit fields of the root record directly on the working copy
    pub fn edit_root<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut Aggregate),
    {
        match self.current.as_mut() {
            Some(current) => {
                edit(current);
                self.focus = current.aggregate_type().root();
                self.modified = true;
                true
            }
            None => false,
        }
    }

    /// Load a sub-record into the form without touching it
    pub fn open_record(&mut self, record: SubRecord) {
        self.focus = record.record_type();
        self.pending = Some(record);
    }

    /// Put a sub-record in the form; replaces any previous pending record
    pub fn edit_record(&mut self, record: SubRecord) {
        self.focus = record.record_type();
        self.pending = Some(record);
        self.modified = true;
    }

    /// Keep the pending edit: reconcile it into the working copy
    pub fn keep_pending(&mut self) -> bool {
        let (current, record) = match (self.current.as_mut(), self.pending.take()) {
            (Some(current), Some(record)) => (current, record),
            _ => return false,
        };
        reconcile::apply(current, record)
    }

    /// Throw the pending edit away; the working copy is untouched
    pub fn drop_pending(&mut self) -> Option<SubRecord> {
        self.pending.take()
    }

    /// Has the form's record changed from its persisted counterpart?
    pub fn pending_changed(&self) -> bool {
        match (self.source.as_ref(), self.pending.as_ref()) {
            (Some(source), Some(record)) => compare::has_changed(source, Candidate::Record(record)),
            _ => false,
        }
    }

    /// Does the form's record differ from its counterpart in the working
    /// copy? A kept edit that is then reverted differs here even though it
    /// matches the source again.
    pub fn pending_unkept(&self) -> bool {
        match (self.current.as_ref(), self.pending.as_ref()) {
            (Some(current), Some(record)) => compare::has_changed(current, Candidate::Record(record)),
            _ => false,
        }
    }

    /// Does anything in the session differ from the source?
    pub fn has_changes(&self) -> bool {
        let (source, current) = match (self.source.as_ref(), self.current.as_ref()) {
            (Some(source), Some(current)) => (source, current),
            (None, Some(_)) => return true,
            _ => return false,
        };
        source.is_new() || self.pending_changed() || compare::aggregate_changed(source, current)
    }

    /// Working copy with the pending edit applied, leaving the session as is
    pub fn working_copy(&self) -> Option<Aggregate> {
        self.current
            .as_ref()
            .map(|current| reconcile::reconcile(current, self.pending.as_ref()))
    }

    pub fn changed_record_types(&self) -> Vec<RecordType> {
        match (self.source.as_ref(), self.working_copy()) {
            (Some(source), Some(working)) => compare::changed_record_types(source, &working),
            _ => Vec::new(),
        }
    }

    /// Display names of changed record types
    pub fn associated_record_names(&self) -> Vec<String> {
        match (self.source.as_ref(), self.working_copy()) {
            (Some(source), Some(working)) => compare::associated_record_names(source, &working),
            _ => Vec::new(),
        }
    }

    pub fn pao_changed(&self) -> bool {
        match (self.source.as_ref(), self.working_copy()) {
            (Some(source), Some(working)) => compare::pao_changed(source, &working),
            _ => false,
        }
    }

    /// End the session. The last good snapshot survives.
    pub fn clear(&mut self) {
        self.source = None;
        self.current = None;
        self.pending = None;
        self.modified = false;
        self.focus = RecordType::Street;
    }

    /// Record a successful save and end the session
    pub fn mark_saved(&mut self, saved: Aggregate) {
        self.last_good = Some(saved);
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::*;

    fn high_street() -> Aggregate {
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(1, 100, "High St", "ENG"));
        Aggregate::Street(street)
    }

    #[test]
    fn test_open_is_unchanged() {
        let mut session = EditSession::new();
        assert!(!session.is_active());

        session.open(high_street());
        assert!(session.is_active());
        assert!(!session.has_changes());
        assert_eq!(session.focus(), RecordType::Street);
        assert_eq!(session.last_good(), Some(&high_street()));
    }

    #[test]
    fn test_identical_pending_record_is_not_a_change() {
        let mut session = EditSession::new();
        session.open(high_street());

        let mut same = Descriptor::new(1, 100, "High St", "ENG");
        same.stamp.last_user = Some("viewer".to_string());
        session.edit_record(SubRecord::Descriptor(same));

        assert!(session.is_modified());
        assert!(!session.has_changes());
    }

    #[test]
    fn test_pending_edit_is_a_change() {
        let mut session = EditSession::new();
        session.open(high_street());
        session.edit_record(SubRecord::Descriptor(Descriptor::new(1, 100, "High Street", "ENG")));

        assert!(session.has_changes());
        assert_eq!(session.focus(), RecordType::Descriptor);
        assert_eq!(session.changed_record_types(), vec![RecordType::Descriptor]);
        assert_eq!(session.associated_record_names(), vec!["descriptor".to_string()]);
    }

    #[test]
    fn test_open_record_is_not_an_edit() {
        let mut session = EditSession::new();
        session.open(high_street());
        session.open_record(SubRecord::Descriptor(Descriptor::new(1, 100, "High St", "ENG")));

        assert!(!session.is_modified());
        assert_eq!(session.focus(), RecordType::Descriptor);
        assert!(!session.pending_changed());
    }

    #[test]
    fn test_keep_then_drop() {
        let mut session = EditSession::new();
        session.open(high_street());
        session.edit_record(SubRecord::Descriptor(Descriptor::new(1, 100, "High Street", "ENG")));

        assert!(session.keep_pending());
        assert!(session.pending().is_none());
        assert_eq!(session.current().map(|a| a.label()), Some("High Street".to_string()));
        assert!(session.has_changes());

        // Nothing pending any more
        assert!(!session.keep_pending());
        assert!(session.drop_pending().is_none());
    }

    #[test]
    fn test_kept_then_reverted_dedication_is_unchanged() {
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(1, 100, "High St", "ENG"));
        for esu_id in [55, 56] {
            let mut esu = Esu::new(esu_id, 100, 1);
            esu.highway_dedications.push(HighwayDedication {
                pk_id: esu_id,
                esu_id,
                code: 2,
                ..Default::default()
            });
            street.esus.push(esu);
        }

        let mut session = EditSession::new();
        session.open(Aggregate::Street(street.clone()));

        let mut hd = street.esus[0].highway_dedications[0].clone();
        hd.code = 4;
        session.edit_record(SubRecord::HighwayDedication(hd.clone()));
        assert!(session.keep_pending());
        assert!(session.has_changes());

        hd.code = 2;
        session.edit_record(SubRecord::HighwayDedication(hd));
        assert!(session.keep_pending());

        // The owning ESU now sits last in the working copy
        let order: Vec<i64> = session.current().unwrap().as_street().unwrap().esus.iter().map(|e| e.esu_id).collect();
        assert_eq!(order, vec![56, 55]);
        assert!(session.changed_record_types().is_empty());
        assert!(!session.has_changes());
    }

    #[test]
    fn test_drop_pending_leaves_working_copy() {
        let mut session = EditSession::new();
        session.open(high_street());
        session.edit_record(SubRecord::Descriptor(Descriptor::new(1, 100, "High Street", "ENG")));

        assert!(session.drop_pending().is_some());
        assert!(!session.has_changes());
        assert_eq!(session.current(), Some(&high_street()));
    }

    #[test]
    fn test_working_copy_does_not_mutate() {
        let mut session = EditSession::new();
        session.open(high_street());
        session.edit_record(SubRecord::Descriptor(Descriptor::new(1, 100, "High Street", "ENG")));

        let working = session.working_copy().unwrap();
        assert_eq!(working.label(), "High Street");
        assert!(session.pending().is_some());
        assert_eq!(session.current(), Some(&high_street()));
    }

    #[test]
    fn test_new_aggregate_always_has_changes() {
        let mut session = EditSession::new();
        session.start_new(Aggregate::Property(Property::blank(9050)));
        assert!(session.has_changes());
        assert_eq!(session.focus(), RecordType::Property);
    }

    #[test]
    fn test_edit_root() {
        let mut session = EditSession::new();
        assert!(!session.edit_root(|_| {}));

        session.open(high_street());
        assert!(session.edit_root(|a| {
            if let Aggregate::Street(s) = a {
                s.state = Some(2);
            }
        }));
        assert_eq!(session.changed_record_types(), vec![RecordType::Street]);
    }

    #[test]
    fn test_mark_saved_keeps_snapshot() {
        let mut session = EditSession::new();
        session.open(high_street());
        let first_id = session.id();

        let mut saved = high_street();
        if let Aggregate::Street(s) = &mut saved {
            s.version = 2;
        }
        session.mark_saved(saved.clone());

        assert!(!session.is_active());
        assert!(!session.has_changes());
        assert_eq!(session.last_good(), Some(&saved));

        session.open(high_street());
        assert_ne!(session.id(), first_id);
    }
}
