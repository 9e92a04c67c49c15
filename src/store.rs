//! Persistence gateway: existence check, insert-once, and batch commit keyed by the
//! registration number.

use std::path::Path;

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::record::{ProjectRecord, Promoter, PromoterDetails, StoredProject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with this key was already stored; nothing was written.
    AlreadyPresent,
}

pub trait ProjectStore {
    fn exists(&mut self, natural_key: &str) -> Result<bool, StoreError>;

    /// Insert unless the key is already present. Never overwrites.
    fn insert(&mut self, record: &ProjectRecord) -> Result<InsertOutcome, StoreError>;

    /// Make every insert since the last commit durable.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Every committed record.
    fn all(&mut self) -> Result<Vec<StoredProject>, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    natural_key TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    address TEXT,
    promoter_name TEXT NOT NULL,
    details_attempted INTEGER NOT NULL DEFAULT 0,
    company_name TEXT,
    registration_no TEXT,
    correspondence_office_address TEXT,
    registered_office_address TEXT,
    entity_type TEXT,
    email TEXT,
    mobile TEXT,
    telephone TEXT,
    gst_no TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

const SELECT_COLUMNS: &str = "id, natural_key, name, address, promoter_name, details_attempted, \
     company_name, registration_no, correspondence_office_address, registered_office_address, \
     entity_type, email, mobile, telephone, gst_no";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening project store {:?}", path);
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }

    fn in_batch(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl ProjectStore for SqliteStore {
    fn exists(&mut self, natural_key: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM projects WHERE natural_key = ?1 LIMIT 1",
                params![natural_key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&mut self, record: &ProjectRecord) -> Result<InsertOutcome, StoreError> {
        if !self.in_batch() {
            self.conn.execute_batch("BEGIN")?;
        }

        let details = record.promoter.details.clone().unwrap_or_default();
        let changed = self.conn.execute(
            "INSERT INTO projects (
                natural_key, name, address, promoter_name, details_attempted,
                company_name, registration_no, correspondence_office_address,
                registered_office_address, entity_type, email, mobile, telephone, gst_no
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(natural_key) DO NOTHING",
            params![
                record.natural_key,
                record.name,
                record.address,
                record.promoter.name,
                record.promoter.details.is_some(),
                details.company_name,
                details.registration_no,
                details.correspondence_office_address,
                details.registered_office_address,
                details.entity_type,
                details.email,
                details.mobile,
                details.telephone,
                details.gst_no,
            ],
        )?;

        if changed == 0 {
            debug!("Key {} already stored; insert ignored", record.natural_key);
            Ok(InsertOutcome::AlreadyPresent)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.in_batch() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn all(&mut self) -> Result<Vec<StoredProject>, StoreError> {
        let sql = format!("SELECT {} FROM projects ORDER BY id", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], stored_project)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }
}

fn stored_project(row: &Row<'_>) -> rusqlite::Result<StoredProject> {
    let attempted: bool = row.get(5)?;
    let details = if attempted {
        Some(PromoterDetails {
            company_name: row.get(6)?,
            registration_no: row.get(7)?,
            correspondence_office_address: row.get(8)?,
            registered_office_address: row.get(9)?,
            entity_type: row.get(10)?,
            email: row.get(11)?,
            mobile: row.get(12)?,
            telephone: row.get(13)?,
            gst_no: row.get(14)?,
        })
    } else {
        None
    };

    Ok(StoredProject {
        id: row.get(0)?,
        record: ProjectRecord {
            natural_key: row.get(1)?,
            name: row.get(2)?,
            address: row.get(3)?,
            promoter: Promoter {
                name: row.get(4)?,
                details,
            },
        },
    })
}

/// In-process store with the same batch semantics as [`SqliteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Vec<ProjectRecord>,
    pending: Vec<ProjectRecord>,
    pub commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ProjectRecord>) -> Self {
        MemoryStore {
            committed: records,
            ..Self::default()
        }
    }

    pub fn committed(&self) -> &[ProjectRecord] {
        &self.committed
    }

    pub fn pending(&self) -> &[ProjectRecord] {
        &self.pending
    }
}

impl ProjectStore for MemoryStore {
    fn exists(&mut self, natural_key: &str) -> Result<bool, StoreError> {
        Ok(self
            .committed
            .iter()
            .chain(self.pending.iter())
            .any(|r| r.natural_key == natural_key))
    }

    fn insert(&mut self, record: &ProjectRecord) -> Result<InsertOutcome, StoreError> {
        if self.exists(&record.natural_key)? {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.pending.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.committed.append(&mut self.pending);
        self.commits += 1;
        Ok(())
    }

    fn all(&mut self) -> Result<Vec<StoredProject>, StoreError> {
        Ok(self
            .committed
            .iter()
            .enumerate()
            .map(|(i, record)| StoredProject {
                id: i as i64 + 1,
                record: record.clone(),
            })
            .collect())
    }
}
