//! Violation ledger
//!
//! The only writer of point effects. Every operation pairs its violation-row
//! write with the matching `student_points` write inside one immediate
//! transaction, so the aggregate invariant
//! `total == sum(points) over live violations` holds after every call.
//! SQLite's write lock serializes concurrent ledger writes for the same
//! student; a failed transaction rolls back both writes.

use crate::db::{
    last_insert_rowid, now_rfc3339, Database, DbError, NewStudentPoints, NewViolation, Result,
    Violation, ViolationType,
};
use crate::schema::{student_points, students, violation_types, violations};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// Violation dates are stored as `YYYY-MM-DD` text
pub(crate) fn validate_violation_date(date: &str) -> Result<()> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| {
            DbError::Validation(format!(
                "Invalid violation date '{}' (expected YYYY-MM-DD)",
                date
            ))
        })
}

/// Apply a point delta to a student's aggregate row, creating it on first use.
///
/// Must be called inside the same transaction as the violation write it
/// accounts for.
pub(crate) fn apply_points_delta(
    conn: &mut SqliteConnection,
    student_id: i32,
    delta: i32,
) -> QueryResult<()> {
    let now = now_rfc3339();
    let seed = NewStudentPoints {
        student_id,
        total: delta,
        updated_at: &now,
    };

    diesel::insert_into(student_points::table)
        .values(&seed)
        .on_conflict(student_points::student_id)
        .do_update()
        .set((
            student_points::total.eq(student_points::total + delta),
            student_points::updated_at.eq(&now),
        ))
        .execute(conn)?;
    Ok(())
}

fn student_exists(conn: &mut SqliteConnection, student_id: i32) -> Result<()> {
    let found = students::table
        .filter(students::id.eq(student_id))
        .select(students::id)
        .first::<i32>(conn)
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(DbError::NotFound(format!(
            "Student {} does not exist",
            student_id
        ))),
    }
}

/// Partial update for an existing violation. `None` leaves a field unchanged;
/// changing `points` adjusts the student's aggregate by the difference.
///
/// `action_taken` and `notes` are doubly optional so they can be cleared:
/// an absent field is `None` (keep), a JSON `null` is `Some(None)` (clear),
/// and a string is `Some(Some(..))` (replace).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ViolationUpdate {
    pub violation_date: Option<String>,
    pub points: Option<i32>,
    #[serde(default, deserialize_with = "clearable")]
    pub action_taken: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable")]
    pub notes: Option<Option<String>>,
}

/// Present-but-null deserializes to `Some(None)`; serde only applies the
/// field default when the key is absent entirely.
fn clearable<'de, D>(de: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(de).map(Some)
}

impl Database {
    /// Record a violation against a student.
    ///
    /// When `points` is `None` the type's current `default_points` is
    /// captured; either way the stored value is fixed from here on and later
    /// changes to the type do not touch it. The student's aggregate is
    /// incremented in the same transaction.
    pub fn record_violation(
        &self,
        student_id: i32,
        type_id: i32,
        violation_date: &str,
        points: Option<i32>,
        action_taken: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Violation> {
        validate_violation_date(violation_date)?;
        if let Some(p) = points {
            if p < 0 {
                return Err(DbError::Validation("Points cannot be negative".into()));
            }
        }

        let mut conn = self.get_conn()?;
        conn.immediate_transaction::<_, DbError, _>(|conn| {
            student_exists(conn, student_id)?;

            let vtype = violation_types::table
                .filter(violation_types::id.eq(type_id))
                .first::<ViolationType>(conn)
                .optional()?
                .ok_or_else(|| {
                    DbError::NotFound(format!("Violation type {} does not exist", type_id))
                })?;

            let recorded_points = points.unwrap_or(vtype.default_points);
            let now = now_rfc3339();

            let new_violation = NewViolation {
                student_id,
                type_id,
                violation_date,
                points: recorded_points,
                action_taken,
                notes,
                created_at: &now,
                updated_at: &now,
            };

            diesel::insert_into(violations::table)
                .values(&new_violation)
                .execute(conn)?;
            let id = last_insert_rowid(conn)?;

            apply_points_delta(conn, student_id, recorded_points)?;

            let row = violations::table
                .filter(violations::id.eq(id))
                .first::<Violation>(conn)?;
            Ok(row)
        })
    }

    /// Amend an existing violation.
    ///
    /// Date, action and notes edits never touch the aggregate; a points edit
    /// applies `new - old` to it in the same transaction, regardless of what
    /// the type's default is by now.
    pub fn amend_violation(&self, violation_id: i32, update: ViolationUpdate) -> Result<Violation> {
        if let Some(ref date) = update.violation_date {
            validate_violation_date(date)?;
        }
        if let Some(p) = update.points {
            if p < 0 {
                return Err(DbError::Validation("Points cannot be negative".into()));
            }
        }

        let mut conn = self.get_conn()?;
        conn.immediate_transaction::<_, DbError, _>(|conn| {
            let old = violations::table
                .filter(violations::id.eq(violation_id))
                .first::<Violation>(conn)
                .optional()?
                .ok_or_else(|| {
                    DbError::NotFound(format!("Violation {} does not exist", violation_id))
                })?;

            let now = now_rfc3339();
            let new_points = update.points.unwrap_or(old.points);
            let new_date = update
                .violation_date
                .clone()
                .unwrap_or_else(|| old.violation_date.clone());
            let new_action = update
                .action_taken
                .clone()
                .unwrap_or_else(|| old.action_taken.clone());
            let new_notes = update.notes.clone().unwrap_or_else(|| old.notes.clone());

            diesel::update(violations::table.filter(violations::id.eq(violation_id)))
                .set((
                    violations::violation_date.eq(&new_date),
                    violations::points.eq(new_points),
                    violations::action_taken.eq(new_action),
                    violations::notes.eq(new_notes),
                    violations::updated_at.eq(&now),
                ))
                .execute(conn)?;

            let delta = new_points - old.points;
            if delta != 0 {
                apply_points_delta(conn, old.student_id, delta)?;
            }

            let row = violations::table
                .filter(violations::id.eq(violation_id))
                .first::<Violation>(conn)?;
            Ok(row)
        })
    }

    /// Delete a violation and subtract its recorded points from the student's
    /// aggregate. A second call for the same id reports `NotFound`; it can
    /// never decrement twice.
    pub fn expunge_violation(&self, violation_id: i32) -> Result<()> {
        let mut conn = self.get_conn()?;
        conn.immediate_transaction::<_, DbError, _>(|conn| {
            let old = violations::table
                .filter(violations::id.eq(violation_id))
                .first::<Violation>(conn)
                .optional()?
                .ok_or_else(|| {
                    DbError::NotFound(format!("Violation {} does not exist", violation_id))
                })?;

            diesel::delete(violations::table.filter(violations::id.eq(violation_id)))
                .execute(conn)?;
            apply_points_delta(conn, old.student_id, -old.points)?;
            Ok(())
        })
    }

    /// Get a single violation by id
    pub fn get_violation(&self, violation_id: i32) -> Result<Violation> {
        let mut conn = self.get_conn()?;
        violations::table
            .filter(violations::id.eq(violation_id))
            .first::<Violation>(&mut conn)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("Violation {} does not exist", violation_id)))
    }
}
