//! Minimal student directory
//!
//! Master-data management for students lives in the wider administration
//! product; the ledger only needs enough of a directory to resolve display
//! names, check existence before writing, and cascade removals.

use crate::db::{last_insert_rowid, now_rfc3339, Database, DbError, NewStudent, Result, Student};
use crate::schema::{student_points, students, violations};
use diesel::prelude::*;

impl Database {
    /// Register a student. `nis` is the school-issued student number and must
    /// be unique.
    pub fn add_student(&self, nis: &str, name: &str, class_name: Option<&str>) -> Result<i32> {
        if nis.trim().is_empty() {
            return Err(DbError::Validation("Student number cannot be empty".into()));
        }
        if name.trim().is_empty() {
            return Err(DbError::Validation("Student name cannot be empty".into()));
        }

        let mut conn = self.get_conn()?;
        let now = now_rfc3339();

        let new_student = NewStudent {
            nis,
            name,
            class_name,
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(students::table)
            .values(&new_student)
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        Ok(id)
    }

    /// Update a student's name and/or class. `None` leaves a field unchanged.
    pub fn update_student(
        &self,
        student_id: i32,
        name: Option<&str>,
        class_name: Option<&str>,
    ) -> Result<Student> {
        if let Some(n) = name {
            if n.trim().is_empty() {
                return Err(DbError::Validation("Student name cannot be empty".into()));
            }
        }

        let mut conn = self.get_conn()?;
        let existing = students::table
            .filter(students::id.eq(student_id))
            .first::<Student>(&mut conn)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("Student {} does not exist", student_id)))?;

        let now = now_rfc3339();
        let new_name = name.unwrap_or(&existing.name);
        let new_class = match class_name {
            Some(c) => Some(c.to_string()),
            None => existing.class_name.clone(),
        };

        diesel::update(students::table.filter(students::id.eq(student_id)))
            .set((
                students::name.eq(new_name),
                students::class_name.eq(new_class),
                students::updated_at.eq(&now),
            ))
            .execute(&mut conn)?;

        let updated = students::table
            .filter(students::id.eq(student_id))
            .first::<Student>(&mut conn)?;
        Ok(updated)
    }

    /// Remove a student along with their violations and aggregate row.
    ///
    /// Returns the number of violation records that went with them.
    pub fn remove_student(&self, student_id: i32) -> Result<usize> {
        let mut conn = self.get_conn()?;

        conn.immediate_transaction::<_, DbError, _>(|conn| {
            // Children first: the student row is referenced by both tables
            let removed_violations =
                diesel::delete(violations::table.filter(violations::student_id.eq(student_id)))
                    .execute(conn)?;
            diesel::delete(
                student_points::table.filter(student_points::student_id.eq(student_id)),
            )
            .execute(conn)?;

            let deleted = diesel::delete(students::table.filter(students::id.eq(student_id)))
                .execute(conn)?;
            if deleted == 0 {
                return Err(DbError::NotFound(format!(
                    "Student {} does not exist",
                    student_id
                )));
            }

            Ok(removed_violations)
        })
    }

    /// Get a student by id
    pub fn get_student(&self, student_id: i32) -> Result<Student> {
        let mut conn = self.get_conn()?;
        students::table
            .filter(students::id.eq(student_id))
            .first::<Student>(&mut conn)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("Student {} does not exist", student_id)))
    }

    /// All students, ordered by name
    pub fn list_students(&self) -> Result<Vec<Student>> {
        let mut conn = self.get_conn()?;
        let rows = students::table
            .order(students::name.asc())
            .load::<Student>(&mut conn)?;
        Ok(rows)
    }
}
