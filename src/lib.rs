// Gazetteer Edit - Core Library
// Change detection, sandbox reconciliation and the navigation gate for
// street and property editing. Used by the CLI/TUI binary and tests.

pub mod records; // Record model (street and property aggregates)

pub mod compare;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod error_list;
pub mod lookup;
pub mod navigation;
pub mod notification;
pub mod profile;
pub mod reconcile;
pub mod record_type;
pub mod sandbox;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use compare::{aggregate_changed, changed_record_types, has_changed, Candidate};
pub use config::Settings;
pub use confirmation::{
    Cancelled, Choice, ConfirmPrompt, ConfirmVariant, ConfirmationRequest, ConfirmationService, Decision,
};
pub use error::{EditError, EditResult};
pub use error_list::{Clipboard, ErrorEntry, ErrorList, MemoryClipboard, RecordFocus};
pub use lookup::{classify_response, updated_lookups, LookupEntry, LookupKind, LookupResponse};
pub use navigation::{BlockReason, EditController, FocusOutcome, NavigationAction, NavigationOutcome};
pub use notification::{Notification, NotificationBar, NotificationKind};
pub use profile::{Jurisdiction, Profile};
pub use record_type::{AggregateType, RecordType};
pub use records::{Aggregate, ChangeType, Property, Record, Street, SubRecord};
pub use sandbox::EditSession;
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use validation::{RecordValidator, ValidationReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
