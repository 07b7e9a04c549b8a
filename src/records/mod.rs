// Gazetteer record models
//
// Two aggregates are edited: a Street (USRN) and a Property (UPRN). Each owns
// collections of sub-records. Every sub-record has:
// - A stable primary key (pk_id); negative keys mark records not yet saved
// - A change marker telling the save endpoint what happened to it
// - A link to its parent (usrn, uprn, or esu_id for ESU children)
// - Bookkeeping stamps that never count as a change

use crate::record_type::RecordType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CHANGE TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "I")]
    Insert,
    #[serde(rename = "U")]
    Update,
    #[serde(rename = "D")]
    Delete,
    #[default]
    #[serde(rename = "N")]
    Unchanged,
}

// ============================================================================
// STAMP (volatile bookkeeping)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamp {
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_update_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_user: Option<String>,
}

impl Stamp {
    pub fn touch(&mut self, user: &str, now: DateTime<Utc>) {
        if self.entry_date.is_none() {
            self.entry_date = Some(now.date_naive());
        }
        self.last_update_date = Some(now.date_naive());
        self.last_updated = Some(now);
        self.last_user = Some(user.to_string());
    }
}

/// Keys every comparison ignores
pub const VOLATILE_KEYS: &[&str] = &[
    "changeType",
    "entryDate",
    "lastUpdateDate",
    "lastUpdated",
    "lastUser",
];

// ============================================================================
// RECORD TRAIT
// ============================================================================

/// A typed sub-record living in one of an aggregate's collections
pub trait Record: Clone + Serialize {
    const RECORD_TYPE: RecordType;

    /// Fields excluded when deciding whether the record changed
    const IGNORE_KEYS: &'static [&'static str] = VOLATILE_KEYS;

    fn pk_id(&self) -> i64;
    fn set_pk_id(&mut self, pk_id: i64);
    fn change_type(&self) -> ChangeType;
    fn set_change_type(&mut self, change_type: ChangeType);
    fn stamp_mut(&mut self) -> &mut Stamp;

    /// Owning ESU for ESU children
    fn esu_id(&self) -> Option<i64> {
        None
    }

    fn is_new(&self) -> bool {
        self.pk_id() < 0
    }
}

macro_rules! impl_record {
    (@body $ty:ty, $rt:expr, $pk:ident, $keys:expr, { $($extra:tt)* }) => {
        impl $crate::records::Record for $ty {
            const RECORD_TYPE: $crate::record_type::RecordType = $rt;
            const IGNORE_KEYS: &'static [&'static str] = $keys;

            fn pk_id(&self) -> i64 {
                self.$pk
            }

            fn set_pk_id(&mut self, pk_id: i64) {
                self.$pk = pk_id;
            }

            fn change_type(&self) -> $crate::records::ChangeType {
                self.change_type
            }

            fn set_change_type(&mut self, change_type: $crate::records::ChangeType) {
                self.change_type = change_type;
            }

            fn stamp_mut(&mut self) -> &mut $crate::records::Stamp {
                &mut self.stamp
            }

            $($extra)*
        }
    };
    ($ty:ty, $rt:expr, $pk:ident) => {
        impl_record!(@body $ty, $rt, $pk, $crate::records::VOLATILE_KEYS, {});
    };
    ($ty:ty, $rt:expr, $pk:ident, ignore = $keys:expr) => {
        impl_record!(@body $ty, $rt, $pk, $keys, {});
    };
    ($ty:ty, $rt:expr, $pk:ident, esu_child) => {
        impl_record!(@body $ty, $rt, $pk, $crate::records::VOLATILE_KEYS, {
            fn esu_id(&self) -> Option<i64> {
                Some(self.esu_id)
            }
        });
    };
}

pub mod aggregate;
pub mod property;
pub mod street;

pub use aggregate::{Aggregate, SubRecord};
pub use property::{
    Classification, CrossReference, Lpi, Organisation, PaoDetails, Property, PropertyNote,
    Provenance, SuccessorCrossReference,
};
pub use street::{
    Construction, Descriptor, Esu, HighwayDedication, HwwRestriction, Interest,
    MaintenanceResponsibility, OneWayExemption, OsSpecialDesignation, PublicRightOfWay,
    ReinstatementCategory, SpecialDesignation, Street, StreetNote,
};

/// Next free positive key in a collection
pub(crate) fn next_key<T: Record>(records: &[T]) -> i64 {
    records.iter().map(|r| r.pk_id()).max().unwrap_or(0).max(0) + 1
}
