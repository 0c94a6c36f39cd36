//! Violation taxonomy
//!
//! Categories own types; types carry the default point weight suggested when
//! an incident is recorded. Deleting a category (or type) cascades: dependent
//! violations are removed and every affected student's aggregate is rewound
//! by the recorded point values, all inside one transaction. The cascade is a
//! deliberate code path, not a foreign-key side effect, so the dependent
//! counts can be reported back to the caller.

use crate::db::{
    last_insert_rowid, now_rfc3339, Database, DbError, NewViolationCategory, NewViolationType,
    Result, ViolationCategory, ViolationType,
};
use crate::ledger::apply_points_delta;
use crate::schema::{violation_categories, violation_types, violations};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::HashMap;

/// What a cascade delete removed
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CascadeSummary {
    pub types_removed: usize,
    pub violations_removed: usize,
}

/// Remove all violations referencing the given types, rewinding each affected
/// student's aggregate by the recorded (not current-default) point values.
fn cascade_violations_for_types(
    conn: &mut SqliteConnection,
    type_ids: &[i32],
) -> std::result::Result<usize, DbError> {
    if type_ids.is_empty() {
        return Ok(0);
    }

    let affected: Vec<(i32, i32)> = violations::table
        .filter(violations::type_id.eq_any(type_ids))
        .select((violations::student_id, violations::points))
        .load(conn)?;

    let mut per_student: HashMap<i32, i32> = HashMap::new();
    for (student_id, points) in &affected {
        *per_student.entry(*student_id).or_insert(0) += points;
    }

    let removed = diesel::delete(violations::table.filter(violations::type_id.eq_any(type_ids)))
        .execute(conn)?;

    for (student_id, sum) in per_student {
        apply_points_delta(conn, student_id, -sum)?;
    }

    Ok(removed)
}

impl Database {
    // ========================================================================
    // Categories
    // ========================================================================

    /// Create a violation category
    pub fn create_category(&self, name: &str, description: Option<&str>) -> Result<i32> {
        if name.trim().is_empty() {
            return Err(DbError::Validation("Category name cannot be empty".into()));
        }

        let mut conn = self.get_conn()?;
        let now = now_rfc3339();

        let new_category = NewViolationCategory {
            name,
            description,
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(violation_categories::table)
            .values(&new_category)
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        Ok(id)
    }

    /// Update a category's name and/or description
    pub fn update_category(
        &self,
        category_id: i32,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ViolationCategory> {
        if let Some(n) = name {
            if n.trim().is_empty() {
                return Err(DbError::Validation("Category name cannot be empty".into()));
            }
        }

        let mut conn = self.get_conn()?;
        let existing = violation_categories::table
            .filter(violation_categories::id.eq(category_id))
            .first::<ViolationCategory>(&mut conn)
            .optional()?
            .ok_or_else(|| {
                DbError::NotFound(format!("Category {} does not exist", category_id))
            })?;

        let now = now_rfc3339();
        let new_name = name.unwrap_or(&existing.name);
        let new_description = match description {
            Some(d) => Some(d.to_string()),
            None => existing.description.clone(),
        };

        diesel::update(violation_categories::table.filter(violation_categories::id.eq(category_id)))
            .set((
                violation_categories::name.eq(new_name),
                violation_categories::description.eq(new_description),
                violation_categories::updated_at.eq(&now),
            ))
            .execute(&mut conn)?;

        let updated = violation_categories::table
            .filter(violation_categories::id.eq(category_id))
            .first::<ViolationCategory>(&mut conn)?;
        Ok(updated)
    }

    /// Delete a category, cascading to its types and their violations.
    ///
    /// Every affected student's aggregate decreases by the sum of their
    /// removed violations' recorded points. Either the whole cascade commits
    /// or nothing changes.
    pub fn delete_category(&self, category_id: i32) -> Result<CascadeSummary> {
        let mut conn = self.get_conn()?;

        conn.immediate_transaction::<_, DbError, _>(|conn| {
            let type_ids: Vec<i32> = violation_types::table
                .filter(violation_types::category_id.eq(category_id))
                .select(violation_types::id)
                .load(conn)?;

            let violations_removed = cascade_violations_for_types(conn, &type_ids)?;

            let types_removed = diesel::delete(
                violation_types::table.filter(violation_types::category_id.eq(category_id)),
            )
            .execute(conn)?;

            let deleted = diesel::delete(
                violation_categories::table.filter(violation_categories::id.eq(category_id)),
            )
            .execute(conn)?;
            if deleted == 0 {
                return Err(DbError::NotFound(format!(
                    "Category {} does not exist",
                    category_id
                )));
            }

            Ok(CascadeSummary {
                types_removed,
                violations_removed,
            })
        })
    }

    /// Get a category by id
    pub fn get_category(&self, category_id: i32) -> Result<ViolationCategory> {
        let mut conn = self.get_conn()?;
        violation_categories::table
            .filter(violation_categories::id.eq(category_id))
            .first::<ViolationCategory>(&mut conn)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("Category {} does not exist", category_id)))
    }

    /// All categories, ordered by name
    pub fn list_categories(&self) -> Result<Vec<ViolationCategory>> {
        let mut conn = self.get_conn()?;
        let rows = violation_categories::table
            .order(violation_categories::name.asc())
            .load::<ViolationCategory>(&mut conn)?;
        Ok(rows)
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Create a violation type under a category
    pub fn create_type(
        &self,
        category_id: i32,
        name: &str,
        description: Option<&str>,
        default_points: i32,
    ) -> Result<i32> {
        if name.trim().is_empty() {
            return Err(DbError::Validation("Type name cannot be empty".into()));
        }
        if default_points < 0 {
            return Err(DbError::Validation(
                "Default points cannot be negative".into(),
            ));
        }

        let mut conn = self.get_conn()?;

        let category = violation_categories::table
            .filter(violation_categories::id.eq(category_id))
            .select(violation_categories::id)
            .first::<i32>(&mut conn)
            .optional()?;
        if category.is_none() {
            return Err(DbError::NotFound(format!(
                "Category {} does not exist",
                category_id
            )));
        }

        let now = now_rfc3339();
        let new_type = NewViolationType {
            category_id,
            name,
            description,
            default_points,
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(violation_types::table)
            .values(&new_type)
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        Ok(id)
    }

    /// Update a type's name, description and/or default points.
    ///
    /// Changing `default_points` only affects violations recorded afterwards;
    /// existing records keep the value captured at write time.
    pub fn update_type(
        &self,
        type_id: i32,
        name: Option<&str>,
        description: Option<&str>,
        default_points: Option<i32>,
    ) -> Result<ViolationType> {
        if let Some(n) = name {
            if n.trim().is_empty() {
                return Err(DbError::Validation("Type name cannot be empty".into()));
            }
        }
        if let Some(p) = default_points {
            if p < 0 {
                return Err(DbError::Validation(
                    "Default points cannot be negative".into(),
                ));
            }
        }

        let mut conn = self.get_conn()?;
        let existing = violation_types::table
            .filter(violation_types::id.eq(type_id))
            .first::<ViolationType>(&mut conn)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("Type {} does not exist", type_id)))?;

        let now = now_rfc3339();
        let new_name = name.unwrap_or(&existing.name);
        let new_description = match description {
            Some(d) => Some(d.to_string()),
            None => existing.description.clone(),
        };
        let new_default = default_points.unwrap_or(existing.default_points);

        diesel::update(violation_types::table.filter(violation_types::id.eq(type_id)))
            .set((
                violation_types::name.eq(new_name),
                violation_types::description.eq(new_description),
                violation_types::default_points.eq(new_default),
                violation_types::updated_at.eq(&now),
            ))
            .execute(&mut conn)?;

        let updated = violation_types::table
            .filter(violation_types::id.eq(type_id))
            .first::<ViolationType>(&mut conn)?;
        Ok(updated)
    }

    /// Delete a type, cascading to its violations with aggregate rewind
    pub fn delete_type(&self, type_id: i32) -> Result<CascadeSummary> {
        let mut conn = self.get_conn()?;

        conn.immediate_transaction::<_, DbError, _>(|conn| {
            let violations_removed = cascade_violations_for_types(conn, &[type_id])?;

            let deleted =
                diesel::delete(violation_types::table.filter(violation_types::id.eq(type_id)))
                    .execute(conn)?;
            if deleted == 0 {
                return Err(DbError::NotFound(format!(
                    "Type {} does not exist",
                    type_id
                )));
            }

            Ok(CascadeSummary {
                types_removed: 1,
                violations_removed,
            })
        })
    }

    /// Get a type by id
    pub fn get_type(&self, type_id: i32) -> Result<ViolationType> {
        let mut conn = self.get_conn()?;
        violation_types::table
            .filter(violation_types::id.eq(type_id))
            .first::<ViolationType>(&mut conn)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("Type {} does not exist", type_id)))
    }

    /// Types, optionally scoped to one category, ordered by name
    pub fn list_types(&self, category_id: Option<i32>) -> Result<Vec<ViolationType>> {
        let mut conn = self.get_conn()?;
        let rows = match category_id {
            Some(cid) => violation_types::table
                .filter(violation_types::category_id.eq(cid))
                .order(violation_types::name.asc())
                .load::<ViolationType>(&mut conn)?,
            None => violation_types::table
                .order(violation_types::name.asc())
                .load::<ViolationType>(&mut conn)?,
        };
        Ok(rows)
    }
}
