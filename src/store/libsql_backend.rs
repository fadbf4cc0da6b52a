//! libSQL backend: async `RecordRepository` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::forms::model::{
    Department, NewPerson, NewStaff, PersonRecord, StaffRecord, UserId,
};
use crate::store::migrations;
use crate::store::traits::RecordRepository;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn count(&self, table: &str) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count {table}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count {table}: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

const STAFF_COLUMNS: &str = "id, external_user_id, last_name, first_name, patronymic, gender";

const PERSON_COLUMNS: &str =
    "id, last_name, first_name, patronymic, date_of_birth, department, room";

/// Map a libsql error to `Constraint` when SQLite reports one, else `Query`.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

/// Map a libsql Row to a StaffRecord.
///
/// Column order matches STAFF_COLUMNS.
fn row_to_staff(row: &libsql::Row) -> Result<StaffRecord, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("staff row parse: {e}"));
    let gender: String = row.get(5).map_err(parse)?;

    Ok(StaffRecord {
        id: row.get(0).map_err(parse)?,
        external_user_id: UserId::new(row.get::<String>(1).map_err(parse)?),
        last_name: row.get(2).map_err(parse)?,
        first_name: row.get(3).map_err(parse)?,
        patronymic: row.get(4).map_err(parse)?,
        gender: gender.parse().unwrap_or_default(),
    })
}

/// Map a libsql Row to a PersonRecord.
///
/// Column order matches PERSON_COLUMNS.
fn row_to_person(row: &libsql::Row) -> Result<PersonRecord, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("person row parse: {e}"));
    let dob: String = row.get(4).map_err(parse)?;
    let department: i64 = row.get(5).map_err(parse)?;
    let room: i64 = row.get(6).map_err(parse)?;

    Ok(PersonRecord {
        id: row.get(0).map_err(parse)?,
        last_name: row.get(1).map_err(parse)?,
        first_name: row.get(2).map_err(parse)?,
        patronymic: row.get(3).map_err(parse)?,
        date_of_birth: NaiveDate::parse_from_str(&dob, "%Y-%m-%d")
            .map_err(|e| DatabaseError::Query(format!("bad date_of_birth {dob:?}: {e}")))?,
        department: Department::try_from(department)
            .map_err(|e| DatabaseError::Query(format!("bad department {department}: {e}")))?,
        room: u8::try_from(room)
            .map_err(|e| DatabaseError::Query(format!("bad room {room}: {e}")))?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordRepository for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Staff ───────────────────────────────────────────────────────

    async fn exists_staff(&self, user_id: &UserId) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM staff WHERE external_user_id = ?1",
                params![user_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("exists_staff: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("exists_staff: {e}"))),
        }
    }

    async fn get_staff(&self, user_id: &UserId) -> Result<Option<StaffRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE external_user_id = ?1"),
                params![user_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_staff: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_staff(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_staff: {e}"))),
        }
    }

    async fn insert_staff(&self, staff: &NewStaff) -> Result<StaffRecord, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO staff (external_user_id, last_name, first_name, patronymic, gender)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING {STAFF_COLUMNS}"
                ),
                params![
                    staff.external_user_id.as_str(),
                    staff.name.last_name.as_str(),
                    staff.name.first_name.as_str(),
                    staff.name.patronymic.as_str(),
                    staff.gender.as_str(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_staff", e))?;

        let record = match rows.next().await {
            Ok(Some(row)) => row_to_staff(&row)?,
            Ok(None) => {
                return Err(DatabaseError::Query("insert_staff: no row returned".into()));
            }
            Err(e) => return Err(write_error("insert_staff", e)),
        };

        debug!(id = record.id, user_id = %record.external_user_id, "Staff inserted into DB");
        Ok(record)
    }

    async fn count_staff(&self) -> Result<u64, DatabaseError> {
        self.count("staff").await
    }

    // ── Persons ─────────────────────────────────────────────────────

    async fn insert_person(
        &self,
        person: &NewPerson,
        today: NaiveDate,
    ) -> Result<PersonRecord, DatabaseError> {
        person
            .check(today)
            .map_err(|e| DatabaseError::Constraint(format!("insert_person: {e}")))?;

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO persons (last_name, first_name, patronymic, date_of_birth, department, room)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     RETURNING {PERSON_COLUMNS}"
                ),
                params![
                    person.name.last_name.as_str(),
                    person.name.first_name.as_str(),
                    person.name.patronymic.as_str(),
                    person.date_of_birth.format("%Y-%m-%d").to_string(),
                    i64::from(person.department),
                    i64::from(person.room),
                ],
            )
            .await
            .map_err(|e| write_error("insert_person", e))?;

        let record = match rows.next().await {
            Ok(Some(row)) => row_to_person(&row)?,
            Ok(None) => {
                return Err(DatabaseError::Query("insert_person: no row returned".into()));
            }
            Err(e) => return Err(write_error("insert_person", e)),
        };

        debug!(id = record.id, department = record.department.number(), room = record.room, "Person inserted into DB");
        Ok(record)
    }

    async fn list_persons(&self, limit: usize) -> Result<Vec<PersonRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PERSON_COLUMNS} FROM persons ORDER BY id DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_persons: {e}")))?;

        let mut persons = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => persons.push(row_to_person(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_persons: {e}"))),
            }
        }
        Ok(persons)
    }

    async fn count_persons(&self) -> Result<u64, DatabaseError> {
        self.count("persons").await
    }
}
