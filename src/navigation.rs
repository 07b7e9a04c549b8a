// Navigation gate
//
// Every navigation away from the open aggregate goes through `navigate`.
// Unchanged data is dropped silently; changed data raises the save
// confirmation and the user's decision is carried out before the
// navigation proceeds. A failed validation or save blocks the navigation
// and leaves the session exactly as it was.

use crate::config::Settings;
use crate::confirmation::{ConfirmPrompt, ConfirmVariant, ConfirmationService, Decision};
use crate::error_list::{ErrorList, RecordFocus};
use crate::notification::{NotificationBar, NotificationKind};
use crate::record_type::AggregateType;
use crate::records::{Aggregate, Property, Street};
use crate::sandbox::EditSession;
use crate::store::RecordStore;
use crate::validation::{RecordValidator, ValidationReport};
use chrono::Utc;

// ============================================================================
// ACTIONS AND OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationAction {
    Home,
    BackToList,
    CreateStreet,
    CreateProperty,
    /// Select properties on the map/list; leaves the editor
    SelectProperties(Vec<i64>),
    OpenStreet(i64),
    OpenProperty(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Number of validation messages
    ValidationFailed(usize),
    SaveFailed(String),
    LoadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Proceed {
        action: NavigationAction,
        discarded: bool,
        saved: bool,
    },
    Blocked(BlockReason),
    /// Dialog dismissed; nothing changed
    Cancelled,
}

impl NavigationOutcome {
    pub fn proceeded(&self) -> bool {
        matches!(self, NavigationOutcome::Proceed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusOutcome {
    Moved {
        focus: RecordFocus,
        kept: bool,
        discarded: bool,
    },
    Cancelled,
    /// No aggregate is open
    Inactive,
}

enum Gate {
    Clear { discarded: bool, saved: bool },
    Blocked(BlockReason),
    Cancelled,
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct EditController<S: RecordStore> {
    session: EditSession,
    store: S,
    save_confirm: ConfirmationService,
    discard_confirm: ConfirmationService,
    validator: RecordValidator,
    notifications: NotificationBar,
    errors: ErrorList,
    authority: i32,
}

impl<S: RecordStore> EditController<S> {
    pub fn new(store: S, settings: &Settings) -> Self {
        EditController {
            session: EditSession::new(),
            store,
            save_confirm: ConfirmationService::new(ConfirmVariant::Save),
            discard_confirm: ConfirmationService::new(ConfirmVariant::Discard),
            validator: RecordValidator::new(settings.profile()),
            notifications: NotificationBar::new(settings.notification_seconds),
            errors: ErrorList::empty(AggregateType::Street),
            authority: settings.authority,
        }
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut EditSession {
        &mut self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Handle for whatever renders the save dialog
    pub fn save_confirmation(&self) -> ConfirmationService {
        self.save_confirm.clone()
    }

    /// Handle for whatever renders the keep/discard dialog
    pub fn discard_confirmation(&self) -> ConfirmationService {
        self.discard_confirm.clone()
    }

    pub fn notifications(&self) -> &NotificationBar {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationBar {
        &mut self.notifications
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    /// Validate the working copy and refresh the error list
    pub fn validate_current(&mut self) -> Option<ValidationReport> {
        let working = self.session.working_copy()?;
        let report = self.validator.validate(&working);
        self.errors = ErrorList::from_report(&report);
        Some(report)
    }

    /// Leave the current aggregate, resolving unsaved changes first
    pub async fn navigate(&mut self, action: NavigationAction) -> NavigationOutcome {
        tracing::debug!(?action, "Navigation requested");

        let (discarded, saved) = match self.resolve_changes().await {
            Gate::Clear { discarded, saved } => (discarded, saved),
            Gate::Blocked(reason) => {
                tracing::info!(?action, ?reason, "Navigation blocked");
                return NavigationOutcome::Blocked(reason);
            }
            Gate::Cancelled => {
                tracing::info!(?action, "Navigation cancelled");
                return NavigationOutcome::Cancelled;
            }
        };

        if let Err(reason) = self.perform(&action) {
            return NavigationOutcome::Blocked(reason);
        }

        NavigationOutcome::Proceed {
            action,
            discarded,
            saved,
        }
    }

    /// Save the open aggregate and keep editing it
    pub fn save_now(&mut self, cascade: bool) -> Result<Aggregate, BlockReason> {
        let saved = self.persist(cascade)?;
        self.session.open(saved.clone());
        Ok(saved)
    }

    /// Move the editor to another record, settling the form's edit first
    pub async fn focus_record(&mut self, focus: RecordFocus) -> FocusOutcome {
        if !self.session.is_active() {
            return FocusOutcome::Inactive;
        }

        let mut kept = false;
        let mut discarded = false;

        if self.session.pending_unkept() {
            let names = self
                .session
                .pending()
                .map(|r| vec![r.record_type().display_name().to_string()])
                .unwrap_or_default();

            let service = self.discard_confirm.clone();
            match service.open(ConfirmPrompt::from_names(names), false).await {
                Ok(Decision::Discard) => {
                    self.session.drop_pending();
                    discarded = true;
                }
                Ok(_) => {
                    kept = self.session.keep_pending();
                }
                Err(_) => return FocusOutcome::Cancelled,
            }
        } else {
            self.session.drop_pending();
        }

        let target = match focus.index {
            Some(index) if !focus.record_type.is_root() => self
                .session
                .current()
                .and_then(|current| current.record_at(focus.record_type, index, focus.esu_index)),
            _ => None,
        };
        match target {
            Some(record) => self.session.open_record(record),
            None => self.session.set_focus(focus.record_type),
        }

        FocusOutcome::Moved { focus, kept, discarded }
    }

    // ===== GATE =====

    async fn resolve_changes(&mut self) -> Gate {
        if !self.session.is_active() {
            return Gate::Clear {
                discarded: false,
                saved: false,
            };
        }

        if !self.session.has_changes() {
            self.close_session();
            return Gate::Clear {
                discarded: false,
                saved: false,
            };
        }

        let prompt = ConfirmPrompt::from_names(self.session.associated_record_names());
        let cascade_offered = self.cascade_available();

        let service = self.save_confirm.clone();
        let decision = match service.open(prompt, cascade_offered).await {
            Ok(decision) => decision,
            Err(_) => return Gate::Cancelled,
        };

        match decision {
            Decision::Discard => {
                tracing::info!(session = %self.session.id(), "Unsaved changes discarded");
                self.close_session();
                Gate::Clear {
                    discarded: true,
                    saved: false,
                }
            }
            Decision::Save | Decision::SaveCascade => match self.persist(decision == Decision::SaveCascade) {
                Ok(saved) => {
                    self.session.mark_saved(saved);
                    Gate::Clear {
                        discarded: false,
                        saved: true,
                    }
                }
                Err(reason) => Gate::Blocked(reason),
            },
        }
    }

    /// Children exist and the parent's PAO has changed
    fn cascade_available(&self) -> bool {
        let property = match self.session.current() {
            Some(Aggregate::Property(p)) if !p.new_property => p,
            _ => return false,
        };
        if !self.session.pao_changed() {
            return false;
        }
        match self.store.child_count(property.uprn) {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(uprn = property.uprn, error = %e, "Could not count child properties");
                false
            }
        }
    }

    /// Validate then save the working copy. The session is not modified.
    fn persist(&mut self, cascade: bool) -> Result<Aggregate, BlockReason> {
        let working = match self.session.working_copy() {
            Some(working) => working,
            None => return Err(BlockReason::SaveFailed("Nothing to save".to_string())),
        };
        let label = working.label();

        let report = self.validator.validate(&working);
        if !report.is_valid() {
            self.errors = ErrorList::from_report(&report);
            self.notifications.show(
                NotificationKind::ValidationFailed,
                format!("Failed to validate {}", label),
                Utc::now(),
            );
            return Err(BlockReason::ValidationFailed(report.error_count()));
        }

        match self.store.save(&working, cascade) {
            Ok(saved) => {
                self.errors = ErrorList::empty(saved.aggregate_type());
                self.notifications
                    .show(NotificationKind::Success, format!("{} has been saved", saved.label()), Utc::now());
                tracing::info!(key = saved.key(), cascade, "Aggregate saved");
                Ok(saved)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Save failed");
                self.notifications.show(
                    NotificationKind::SaveFailed,
                    format!("Failed to save {}: {}", label, e),
                    Utc::now(),
                );
                Err(BlockReason::SaveFailed(e.to_string()))
            }
        }
    }

    fn close_session(&mut self) {
        let aggregate_type = self
            .session
            .current()
            .map(|a| a.aggregate_type())
            .unwrap_or(AggregateType::Street);
        self.session.clear();
        self.errors = ErrorList::empty(aggregate_type);
    }

    // ===== ACTIONS =====

    fn perform(&mut self, action: &NavigationAction) -> Result<(), BlockReason> {
        match action {
            NavigationAction::Home | NavigationAction::BackToList | NavigationAction::SelectProperties(_) => {
                self.close_session();
            }
            NavigationAction::CreateStreet => {
                self.errors = ErrorList::empty(AggregateType::Street);
                self.session.start_new(Aggregate::Street(Street::blank(self.authority)));
            }
            NavigationAction::CreateProperty => {
                self.errors = ErrorList::empty(AggregateType::Property);
                self.session.start_new(Aggregate::Property(Property::blank(self.authority)));
            }
            NavigationAction::OpenStreet(usrn) => {
                let street = self.store.load_street(*usrn).map_err(|e| {
                    tracing::warn!(usrn, error = %e, "Could not open street");
                    BlockReason::LoadFailed(e.to_string())
                })?;
                self.errors = ErrorList::empty(AggregateType::Street);
                self.session.open(Aggregate::Street(street));
            }
            NavigationAction::OpenProperty(uprn) => {
                let property = self.store.load_property(*uprn).map_err(|e| {
                    tracing::warn!(uprn, error = %e, "Could not open property");
                    BlockReason::LoadFailed(e.to_string())
                })?;
                self.errors = ErrorList::empty(AggregateType::Property);
                self.session.open(Aggregate::Property(property));
            }
        }
        Ok(())
    }
}
