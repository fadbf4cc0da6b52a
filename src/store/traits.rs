//! The storage seam used by the form flow.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DatabaseError;
use crate::forms::model::{NewPerson, NewStaff, PersonRecord, StaffRecord, UserId};

/// Backend-agnostic store for completed intake records.
///
/// Implementations enforce one staff record per external user id and
/// re-check person field ranges before writing.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Staff ───────────────────────────────────────────────────────

    /// Whether a staff record exists for this user.
    async fn exists_staff(&self, user_id: &UserId) -> Result<bool, DatabaseError>;

    /// Get the staff record for this user.
    async fn get_staff(&self, user_id: &UserId) -> Result<Option<StaffRecord>, DatabaseError>;

    /// Insert a staff record. Fails with `Constraint` if the user already has one.
    async fn insert_staff(&self, staff: &NewStaff) -> Result<StaffRecord, DatabaseError>;

    async fn count_staff(&self) -> Result<u64, DatabaseError>;

    // ── Persons ─────────────────────────────────────────────────────

    /// Insert a person record. Fails with `Constraint` on out-of-range fields;
    /// the date of birth is bounded by `today`.
    async fn insert_person(
        &self,
        person: &NewPerson,
        today: NaiveDate,
    ) -> Result<PersonRecord, DatabaseError>;

    /// Most recently inserted persons first, up to `limit`.
    async fn list_persons(&self, limit: usize) -> Result<Vec<PersonRecord>, DatabaseError>;

    async fn count_persons(&self) -> Result<u64, DatabaseError>;
}
