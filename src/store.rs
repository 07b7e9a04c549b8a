// Record store
//
// Persists streets and properties as JSON documents. Every save is recorded
// in an append-only events table ("every change is an event").
//
// Saving a property with cascade copies its PAO onto every child property
// (parent_uprn == uprn) in the same transaction.

use crate::error::{EditError, EditResult};
use crate::record_type::AggregateType;
use crate::records::{Aggregate, Property, Street};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait RecordStore {
    fn load_street(&self, usrn: i64) -> EditResult<Street>;

    fn load_property(&self, uprn: i64) -> EditResult<Property>;

    /// Persist the aggregate and return it as stored: keys assigned, change
    /// markers cleared, version bumped
    fn save(&mut self, aggregate: &Aggregate, cascade: bool) -> EditResult<Aggregate>;

    /// Number of properties whose parent is `uprn`
    fn child_count(&self, uprn: i64) -> EditResult<usize>;

    /// Keys of every stored aggregate of one type, ascending
    fn keys(&self, aggregate_type: AggregateType) -> EditResult<Vec<i64>>;
}

/// SHA-256 of the aggregate's JSON document
pub fn fingerprint(aggregate: &Aggregate) -> EditResult<String> {
    let json = serde_json::to_string(aggregate)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn set_key(aggregate: &mut Aggregate, key: i64) {
    match aggregate {
        Aggregate::Street(s) => s.usrn = key,
        Aggregate::Property(p) => p.uprn = key,
    }
}

/// Shared save path: key a new aggregate, key its new sub-records, settle
fn prepare(aggregate: &Aggregate, next_key: i64, actor: &str, now: DateTime<Utc>) -> Aggregate {
    let mut saved = aggregate.clone();
    if saved.is_new() || saved.key() <= 0 {
        set_key(&mut saved, next_key);
    }
    saved.assign_keys();
    saved.settle(actor, now);
    saved
}

/// Copy the parent's PAO to each child; returns the children that changed,
/// already settled
fn cascade_pao(parent: &Property, children: Vec<Property>, actor: &str, now: DateTime<Utc>) -> Vec<Property> {
    children
        .into_iter()
        .filter_map(|mut child| {
            if !child.apply_pao_from(parent) {
                return None;
            }
            let mut aggregate = Aggregate::Property(child);
            aggregate.settle(actor, now);
            match aggregate {
                Aggregate::Property(child) => Some(child),
                Aggregate::Street(_) => None,
            }
        })
        .collect()
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_key: i64,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        aggregate_type: AggregateType,
        aggregate_key: i64,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            aggregate_type: aggregate_type.as_str().to_string(),
            aggregate_key,
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub fn setup_database(conn: &Connection) -> EditResult<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS streets (
            usrn INTEGER PRIMARY KEY,
            document TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS properties (
            uprn INTEGER PRIMARY KEY,
            parent_uprn INTEGER,
            document TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            aggregate_type TEXT NOT NULL,
            aggregate_key INTEGER NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_properties_parent ON properties(parent_uprn)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_aggregate ON events(aggregate_type, aggregate_key)",
        [],
    )?;

    Ok(())
}

fn write_aggregate(conn: &Connection, aggregate: &Aggregate, now: DateTime<Utc>) -> EditResult<String> {
    let print = fingerprint(aggregate)?;
    match aggregate {
        Aggregate::Street(s) => {
            conn.execute(
                "INSERT OR REPLACE INTO streets (usrn, document, fingerprint, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![s.usrn, serde_json::to_string(s)?, print, now.to_rfc3339()],
            )?;
        }
        Aggregate::Property(p) => {
            conn.execute(
                "INSERT OR REPLACE INTO properties (uprn, parent_uprn, document, fingerprint, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![p.uprn, p.parent_uprn, serde_json::to_string(p)?, print, now.to_rfc3339()],
            )?;
        }
    }
    Ok(print)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> EditResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, aggregate_type, aggregate_key, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.aggregate_type,
            event.aggregate_key,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn conversion_error(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

/// Events for one aggregate, newest first
pub fn get_events_for(conn: &Connection, aggregate_type: AggregateType, key: i64) -> EditResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, aggregate_type, aggregate_key, data, actor
         FROM events
         WHERE aggregate_type = ?1 AND aggregate_key = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![aggregate_type.as_str(), key], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(conversion_error)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                aggregate_type: row.get(3)?,
                aggregate_key: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(conversion_error)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub struct SqliteStore {
    conn: Connection,
    actor: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> EditResult<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            actor: "editor".to_string(),
        })
    }

    pub fn open_in_memory() -> EditResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            actor: "editor".to_string(),
        })
    }

    /// User recorded on saved records and events
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Store an aggregate as given, without settling it (imports)
    pub fn import(&mut self, aggregate: &Aggregate) -> EditResult<()> {
        let now = Utc::now();
        let print = write_aggregate(&self.conn, aggregate, now)?;
        let event = Event::new(
            "imported",
            aggregate.aggregate_type(),
            aggregate.key(),
            serde_json::json!({ "fingerprint": print }),
            &self.actor,
        );
        insert_event(&self.conn, &event)
    }

    pub fn count(&self, aggregate_type: AggregateType) -> EditResult<i64> {
        let sql = match aggregate_type {
            AggregateType::Street => "SELECT COUNT(*) FROM streets",
            AggregateType::Property => "SELECT COUNT(*) FROM properties",
        };
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    fn next_key(conn: &Connection, aggregate_type: AggregateType) -> EditResult<i64> {
        let sql = match aggregate_type {
            AggregateType::Street => "SELECT COALESCE(MAX(usrn), 0) + 1 FROM streets",
            AggregateType::Property => "SELECT COALESCE(MAX(uprn), 0) + 1 FROM properties",
        };
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }

    fn children(conn: &Connection, uprn: i64) -> EditResult<Vec<Property>> {
        let mut stmt = conn.prepare("SELECT document FROM properties WHERE parent_uprn = ?1 ORDER BY uprn")?;
        let documents = stmt
            .query_map(params![uprn], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut children = Vec::with_capacity(documents.len());
        for document in documents {
            children.push(serde_json::from_str(&document)?);
        }
        Ok(children)
    }
}

impl RecordStore for SqliteStore {
    fn load_street(&self, usrn: i64) -> EditResult<Street> {
        let document: Option<String> = self
            .conn
            .query_row("SELECT document FROM streets WHERE usrn = ?1", params![usrn], |row| row.get(0))
            .optional()?;
        match document {
            Some(doc) => Ok(serde_json::from_str(&doc)?),
            None => Err(EditError::NotFound {
                kind: AggregateType::Street,
                key: usrn,
            }),
        }
    }

    fn load_property(&self, uprn: i64) -> EditResult<Property> {
        let document: Option<String> = self
            .conn
            .query_row("SELECT document FROM properties WHERE uprn = ?1", params![uprn], |row| row.get(0))
            .optional()?;
        match document {
            Some(doc) => Ok(serde_json::from_str(&doc)?),
            None => Err(EditError::NotFound {
                kind: AggregateType::Property,
                key: uprn,
            }),
        }
    }

    fn save(&mut self, aggregate: &Aggregate, cascade: bool) -> EditResult<Aggregate> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;

        let next = SqliteStore::next_key(&tx, aggregate.aggregate_type())?;
        let saved = prepare(aggregate, next, &self.actor, now);
        let print = write_aggregate(&tx, &saved, now)?;

        let mut cascaded = Vec::new();
        if let (true, Aggregate::Property(parent)) = (cascade, &saved) {
            let children = SqliteStore::children(&tx, parent.uprn)?;
            for child in cascade_pao(parent, children, &self.actor, now) {
                write_aggregate(&tx, &Aggregate::Property(child.clone()), now)?;
                cascaded.push(child.uprn);
            }
        }

        let event = Event::new(
            if aggregate.is_new() { "created" } else { "updated" },
            saved.aggregate_type(),
            saved.key(),
            serde_json::json!({
                "fingerprint": print,
                "version": match &saved {
                    Aggregate::Street(s) => s.version,
                    Aggregate::Property(p) => p.version,
                },
                "cascadedTo": cascaded,
            }),
            &self.actor,
        );
        insert_event(&tx, &event)?;
        tx.commit()?;

        tracing::info!(
            aggregate = %saved.aggregate_type(),
            key = saved.key(),
            cascaded = cascaded.len(),
            "Saved"
        );
        Ok(saved)
    }

    fn child_count(&self, uprn: i64) -> EditResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM properties WHERE parent_uprn = ?1",
            params![uprn],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn keys(&self, aggregate_type: AggregateType) -> EditResult<Vec<i64>> {
        let sql = match aggregate_type {
            AggregateType::Street => "SELECT usrn FROM streets ORDER BY usrn",
            AggregateType::Property => "SELECT uprn FROM properties ORDER BY uprn",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory store for tests and the demo terminal UI
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    streets: HashMap<i64, Street>,
    properties: HashMap<i64, Property>,
    /// When set, every save is rejected with this message
    pub fail_saves: Option<String>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, aggregate: Aggregate) {
        match aggregate {
            Aggregate::Street(s) => {
                self.streets.insert(s.usrn, s);
            }
            Aggregate::Property(p) => {
                self.properties.insert(p.uprn, p);
            }
        }
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn street(&self, usrn: i64) -> Option<&Street> {
        self.streets.get(&usrn)
    }

    pub fn property(&self, uprn: i64) -> Option<&Property> {
        self.properties.get(&uprn)
    }

    pub fn street_keys(&self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.streets.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn property_keys(&self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.properties.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl RecordStore for MemoryStore {
    fn load_street(&self, usrn: i64) -> EditResult<Street> {
        self.streets.get(&usrn).cloned().ok_or(EditError::NotFound {
            kind: AggregateType::Street,
            key: usrn,
        })
    }

    fn load_property(&self, uprn: i64) -> EditResult<Property> {
        self.properties.get(&uprn).cloned().ok_or(EditError::NotFound {
            kind: AggregateType::Property,
            key: uprn,
        })
    }

    fn save(&mut self, aggregate: &Aggregate, cascade: bool) -> EditResult<Aggregate> {
        if let Some(reason) = &self.fail_saves {
            return Err(EditError::Rejected(reason.clone()));
        }

        let now = Utc::now();
        let next = match aggregate.aggregate_type() {
            AggregateType::Street => self.streets.keys().max().copied().unwrap_or(0) + 1,
            AggregateType::Property => self.properties.keys().max().copied().unwrap_or(0) + 1,
        };
        let saved = prepare(aggregate, next, "editor", now);

        if let (true, Aggregate::Property(parent)) = (cascade, &saved) {
            let children: Vec<Property> = self
                .properties
                .values()
                .filter(|p| p.parent_uprn == Some(parent.uprn))
                .cloned()
                .collect();
            for child in cascade_pao(parent, children, "editor", now) {
                self.properties.insert(child.uprn, child);
            }
        }

        self.insert(saved.clone());
        self.saves += 1;
        Ok(saved)
    }

    fn child_count(&self, uprn: i64) -> EditResult<usize> {
        Ok(self
            .properties
            .values()
            .filter(|p| p.parent_uprn == Some(uprn))
            .count())
    }

    fn keys(&self, aggregate_type: AggregateType) -> EditResult<Vec<i64>> {
        Ok(match aggregate_type {
            AggregateType::Street => self.street_keys(),
            AggregateType::Property => self.property_keys(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::*;

    fn mill_house(uprn: i64, parent: Option<i64>, number: i32) -> Property {
        let mut property = Property::new(uprn, 1, 9050);
        property.parent_uprn = parent;
        let mut lpi = Lpi::new(1, uprn, 100, "ENG");
        lpi.pao_start_number = Some(number);
        lpi.pao_text = Some("Mill House".to_string());
        property.lpis.push(lpi);
        property
    }

    #[test]
    fn test_round_trip_through_sqlite() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut street = Street::new(100, 1, 9050);
        street.descriptors.push(Descriptor::new(1, 100, "High Street", "ENG"));
        store.import(&Aggregate::Street(street.clone())).unwrap();

        assert_eq!(store.load_street(100).unwrap(), street);
        assert_eq!(store.count(AggregateType::Street).unwrap(), 1);
    }

    #[test]
    fn test_missing_aggregate_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.load_property(42).unwrap_err();
        assert!(matches!(err, EditError::NotFound { key: 42, .. }));
    }

    #[test]
    fn test_save_new_street_assigns_keys() {
        let mut store = SqliteStore::open_in_memory().unwrap().with_actor("gwen");
        store.import(&Aggregate::Street(Street::new(100, 1, 9050))).unwrap();

        let mut street = Street::blank(9050);
        let mut descriptor = Descriptor::new(-1, 0, "New Road", "ENG");
        descriptor.change_type = ChangeType::Insert;
        street.descriptors.push(descriptor);
        let saved = store.save(&Aggregate::Street(street), false).unwrap();

        let saved = saved.as_street().unwrap();
        assert_eq!(saved.usrn, 101);
        assert!(!saved.new_street);
        assert_eq!(saved.descriptors[0].pk_id, 1);
        assert_eq!(saved.descriptors[0].usrn, 101);
        assert_eq!(saved.descriptors[0].stamp.last_user.as_deref(), Some("gwen"));

        let events = get_events_for(store.connection(), AggregateType::Street, 101).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "created");
        assert_eq!(events[0].actor, "gwen");
    }

    #[test]
    fn test_cascade_updates_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.import(&Aggregate::Property(mill_house(10, None, 14))).unwrap();
        store.import(&Aggregate::Property(mill_house(11, Some(10), 14))).unwrap();
        store.import(&Aggregate::Property(mill_house(12, Some(10), 14))).unwrap();
        store.import(&Aggregate::Property(mill_house(13, None, 14))).unwrap();
        assert_eq!(store.child_count(10).unwrap(), 2);

        let mut parent = mill_house(10, None, 16);
        parent.lpis[0].change_type = ChangeType::Update;
        store.save(&Aggregate::Property(parent), true).unwrap();

        assert_eq!(store.load_property(11).unwrap().lpis[0].pao_start_number, Some(16));
        assert_eq!(store.load_property(12).unwrap().lpis[0].pao_start_number, Some(16));
        assert_eq!(store.load_property(13).unwrap().lpis[0].pao_start_number, Some(14));

        let events = get_events_for(store.connection(), AggregateType::Property, 10).unwrap();
        assert_eq!(events[0].data["cascadedTo"], serde_json::json!([11, 12]));
    }

    #[test]
    fn test_save_without_cascade_leaves_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.import(&Aggregate::Property(mill_house(10, None, 14))).unwrap();
        store.import(&Aggregate::Property(mill_house(11, Some(10), 14))).unwrap();

        store.save(&Aggregate::Property(mill_house(10, None, 16)), false).unwrap();
        assert_eq!(store.load_property(11).unwrap().lpis[0].pao_start_number, Some(14));
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.import(&Aggregate::Property(mill_house(12, None, 14))).unwrap();
        store.import(&Aggregate::Property(mill_house(10, None, 14))).unwrap();

        assert_eq!(store.keys(AggregateType::Property).unwrap(), vec![10, 12]);
        assert!(store.keys(AggregateType::Street).unwrap().is_empty());

        let mut memory = MemoryStore::new();
        memory.insert(Aggregate::Property(mill_house(12, None, 14)));
        memory.insert(Aggregate::Property(mill_house(10, None, 14)));
        assert_eq!(memory.keys(AggregateType::Property).unwrap(), vec![10, 12]);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.import(&Aggregate::Property(mill_house(10, None, 14))).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load_property(10).unwrap().uprn, 10);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Aggregate::Property(mill_house(10, None, 14));
        let b = Aggregate::Property(mill_house(10, None, 14));
        let c = Aggregate::Property(mill_house(10, None, 16));

        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
        assert_eq!(fingerprint(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_memory_store_failure_and_cascade() {
        let mut store = MemoryStore::new();
        store.insert(Aggregate::Property(mill_house(10, None, 14)));
        store.insert(Aggregate::Property(mill_house(11, Some(10), 14)));

        store.fail_saves = Some("offline".to_string());
        let err = store.save(&Aggregate::Property(mill_house(10, None, 16)), true).unwrap_err();
        assert_eq!(err.to_string(), "save rejected: offline");
        assert_eq!(store.save_count(), 0);

        store.fail_saves = None;
        store.save(&Aggregate::Property(mill_house(10, None, 16)), true).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.property(11).unwrap().lpis[0].pao_start_number, Some(16));
        assert_eq!(store.property(11).unwrap().lpis[0].change_type, ChangeType::Unchanged);
    }
}
