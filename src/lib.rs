//! Tatib - student violation tracking and point ledger
//!
//! The disciplinary core of a school administration platform: a taxonomy of
//! violation categories and types, a ledger of dated incidents per student,
//! and a per-student running point total that stays consistent through every
//! create, edit, and delete.
//!
//! # Point accounting
//!
//! Every violation stores the point value captured when it was recorded.
//! Taxonomy edits afterwards never rewrite history: the ledger is always
//! reproducible from its own rows, and the aggregate always equals the sum
//! of a student's live violations.
//!
//! # Quick Start
//!
//! ```no_run
//! use tatib::Database;
//!
//! let db = Database::new("tatib.db").unwrap();
//!
//! // Build the taxonomy
//! let category = db.create_category("Discipline", None).unwrap();
//! let late = db.create_type(category, "Terlambat", None, 5).unwrap();
//!
//! // Record an incident; the student's total moves with it
//! let student = db.add_student("1024", "Aminah", Some("7A")).unwrap();
//! db.record_violation(student, late, "2026-08-17", None, None, None).unwrap();
//! assert_eq!(db.points_for_student(student).unwrap(), 5);
//! ```

pub mod accounts;
pub mod config;
pub mod db;
pub mod init;
pub mod ledger;
pub mod query;
pub mod schema;
pub mod serve;
pub mod students;
pub mod taxonomy;

pub use accounts::EntityKind;
pub use config::Config;
pub use db::{
    AccountLink, Database, DbError, LedgerSchema, Student, StudentPoints, Violation,
    ViolationCategory, ViolationType, CURRENT_SCHEMA,
};
pub use ledger::ViolationUpdate;
pub use query::{Page, PageMeta, RecapRow, SearchFilter, ViolationRow};
pub use taxonomy::CascadeSummary;
