//! Read-only projections over the ledger
//!
//! Listing, paginated search and dashboard totals. Nothing in here writes;
//! any correction to points goes through the ledger operations.

use crate::db::{Database, DbError, Result, Violation};
use crate::schema::{student_points, students, violation_types, violations};
use diesel::prelude::*;

/// Hard cap on page size for search results
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata returned alongside every page
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageMeta {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

/// One page of results
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Search filters for administrative review
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SearchFilter {
    /// Free-text match over student name and type name
    pub q: Option<String>,
    /// Inclusive lower bound on violation date (YYYY-MM-DD)
    pub from: Option<String>,
    /// Inclusive upper bound on violation date (YYYY-MM-DD)
    pub to: Option<String>,
}

/// Violation joined with display names for listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct ViolationRow {
    pub id: i32,
    pub student_id: i32,
    pub student_name: String,
    pub type_id: i32,
    pub type_name: String,
    pub violation_date: String,
    pub points: i32,
    pub action_taken: Option<String>,
    pub notes: Option<String>,
}

/// Dashboard row: a student and their running total
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecapRow {
    pub student_id: i32,
    pub nis: String,
    pub student_name: String,
    pub class_name: Option<String>,
    pub total: i32,
}

impl Database {
    /// All violations for one student, newest incident first
    pub fn list_for_student(&self, student_id: i32) -> Result<Vec<Violation>> {
        self.get_student(student_id)?;

        let mut conn = self.get_conn()?;
        let rows = violations::table
            .filter(violations::student_id.eq(student_id))
            .order((violations::violation_date.desc(), violations::id.desc()))
            .load::<Violation>(&mut conn)?;
        Ok(rows)
    }

    /// Paginated search across all violations with display names joined in.
    ///
    /// `q` matches student name or type name (substring); dates are inclusive
    /// bounds and compare lexicographically since they are stored ISO-formatted.
    pub fn search_violations(
        &self,
        filter: &SearchFilter,
        page: i64,
        page_size: i64,
    ) -> Result<Page<ViolationRow>> {
        let current_page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let pattern = format!("%{}%", filter.q.as_deref().unwrap_or(""));
        let from = filter.from.as_deref().unwrap_or("0000-01-01").to_string();
        let to = filter.to.as_deref().unwrap_or("9999-12-31").to_string();

        let mut conn = self.get_conn()?;

        let total_items: i64 = violations::table
            .inner_join(students::table)
            .inner_join(violation_types::table)
            .filter(
                students::name
                    .like(pattern.clone())
                    .or(violation_types::name.like(pattern.clone())),
            )
            .filter(violations::violation_date.ge(from.clone()))
            .filter(violations::violation_date.le(to.clone()))
            .count()
            .get_result(&mut conn)?;

        let rows: Vec<(Violation, String, String)> = violations::table
            .inner_join(students::table)
            .inner_join(violation_types::table)
            .filter(
                students::name
                    .like(pattern.clone())
                    .or(violation_types::name.like(pattern)),
            )
            .filter(violations::violation_date.ge(from))
            .filter(violations::violation_date.le(to))
            .select((
                Violation::as_select(),
                students::name,
                violation_types::name,
            ))
            .order((violations::violation_date.desc(), violations::id.desc()))
            .limit(page_size)
            .offset((current_page - 1) * page_size)
            .load(&mut conn)?;

        let items = rows
            .into_iter()
            .map(|(v, student_name, type_name)| ViolationRow {
                id: v.id,
                student_id: v.student_id,
                student_name,
                type_id: v.type_id,
                type_name,
                violation_date: v.violation_date,
                points: v.points,
                action_taken: v.action_taken,
                notes: v.notes,
            })
            .collect();

        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + page_size - 1) / page_size
        };

        Ok(Page {
            items,
            meta: PageMeta {
                total_items,
                total_pages,
                current_page,
                page_size,
            },
        })
    }

    /// Current aggregate total for one student.
    ///
    /// A student with no recorded violations has total 0; an unknown student
    /// is `NotFound`.
    pub fn points_for_student(&self, student_id: i32) -> Result<i32> {
        self.get_student(student_id)?;

        let mut conn = self.get_conn()?;
        let total = student_points::table
            .filter(student_points::student_id.eq(student_id))
            .select(student_points::total)
            .first::<i32>(&mut conn)
            .optional()?;
        Ok(total.unwrap_or(0))
    }

    /// All students with a nonzero aggregate history, highest total first
    pub fn point_recap(&self) -> Result<Vec<RecapRow>> {
        let mut conn = self.get_conn()?;
        let rows: Vec<(i32, i32, String, String, Option<String>)> = student_points::table
            .inner_join(students::table)
            .select((
                student_points::student_id,
                student_points::total,
                students::nis,
                students::name,
                students::class_name,
            ))
            .order(student_points::total.desc())
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(student_id, total, nis, student_name, class_name)| RecapRow {
                student_id,
                nis,
                student_name,
                class_name,
                total,
            })
            .collect())
    }
}

/// Surface an error the way list callers expect: `NotFound` on amend/expunge
/// of a stale row means the record is gone and the view should refresh.
pub fn user_message(err: &DbError) -> String {
    match err {
        DbError::NotFound(_) => "Record no longer exists, refresh the list".to_string(),
        other => other.to_string(),
    }
}
