//! SQLite database with Diesel ORM
//!
//! Stores the violation taxonomy, the violation ledger, and the per-student
//! point aggregates for a school administration deployment.

use crate::schema::*;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::Path;

/// Resolve the database path.
///
/// Priority: `TATIB_DB_PATH` env var, then the nearest `.tatib/` directory
/// walking up from the current directory, then `.tatib/tatib.db` in the
/// current directory (where `tatib init` would create it).
pub fn get_db_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("TATIB_DB_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let tatib_dir = dir.join(".tatib");
            if tatib_dir.is_dir() {
                return tatib_dir.join("tatib.db");
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break, // Reached filesystem root
            }
        }
    }

    std::path::PathBuf::from(".tatib/tatib.db")
}

/// Current schema version for tatib
pub const CURRENT_SCHEMA: LedgerSchema = LedgerSchema {
    major: 1,
    minor: 0,
    patch: 0,
    name: "violation-ledger",
    features: &[
        "students",
        "violation_categories",
        "violation_types",
        "violations",
        "student_points",
        "account_links",
    ],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct LedgerSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl LedgerSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    pub fn is_compatible_with(&self, other: &LedgerSchema) -> bool {
        self.major == other.major
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature)
    }
}

impl std::fmt::Display for LedgerSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
pub struct NewSchemaVersion<'a> {
    pub version: &'a str,
    pub name: &'a str,
    pub features: &'a str,
    pub introduced_at: &'a str,
}

/// Queryable schema version
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = schema_versions)]
pub struct StoredSchema {
    pub id: i32,
    pub version: String,
    pub name: String,
    pub features: String,
    pub introduced_at: String,
}

/// Insertable student
#[derive(Insertable)]
#[diesel(table_name = students)]
pub struct NewStudent<'a> {
    pub nis: &'a str,
    pub name: &'a str,
    pub class_name: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable student (minimal directory row; master data lives elsewhere)
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = students)]
pub struct Student {
    pub id: i32,
    pub nis: String,
    pub name: String,
    pub class_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable violation category
#[derive(Insertable)]
#[diesel(table_name = violation_categories)]
pub struct NewViolationCategory<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable violation category
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = violation_categories)]
pub struct ViolationCategory {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable violation type
#[derive(Insertable)]
#[diesel(table_name = violation_types)]
pub struct NewViolationType<'a> {
    pub category_id: i32,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub default_points: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable violation type
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = violation_types)]
pub struct ViolationType {
    pub id: i32,
    pub category_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub default_points: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable violation record
#[derive(Insertable)]
#[diesel(table_name = violations)]
pub struct NewViolation<'a> {
    pub student_id: i32,
    pub type_id: i32,
    pub violation_date: &'a str,
    pub points: i32,
    pub action_taken: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable violation record
///
/// `points` is the value captured when the incident was recorded. It is never
/// recomputed from the type's current default; the ledger stays reproducible
/// from its own rows.
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = violations)]
pub struct Violation {
    pub id: i32,
    pub student_id: i32,
    pub type_id: i32,
    pub violation_date: String,
    pub points: i32,
    pub action_taken: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable aggregate row
#[derive(Insertable)]
#[diesel(table_name = student_points)]
pub struct NewStudentPoints<'a> {
    pub student_id: i32,
    pub total: i32,
    pub updated_at: &'a str,
}

/// Queryable aggregate row (one per student, maintained by the ledger only)
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = student_points)]
pub struct StudentPoints {
    pub student_id: i32,
    pub total: i32,
    pub updated_at: String,
}

/// Insertable account link
#[derive(Insertable)]
#[diesel(table_name = account_links)]
pub struct NewAccountLink<'a> {
    pub entity_kind: &'a str,
    pub entity_id: i32,
    pub account_id: i32,
    pub created_at: &'a str,
}

/// Queryable account link
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = account_links)]
pub struct AccountLink {
    pub entity_kind: String,
    pub entity_id: i32,
    pub account_id: i32,
    pub created_at: String,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub(crate) type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug)]
pub enum DbError {
    Connection(String),
    Query(diesel::result::Error),
    Validation(String),
    NotFound(String),
    Conflict(String),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DbError::Query(e) => write!(f, "Query error: {}", e),
            DbError::Validation(msg) => write!(f, "{}", msg),
            DbError::NotFound(msg) => write!(f, "{}", msg),
            DbError::Conflict(msg) => write!(f, "Conflict: {}", msg),
        }
    }
}

impl std::error::Error for DbError {}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => DbError::Conflict(info.message().to_string()),
            other => DbError::Query(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Current local time as RFC 3339 text, the storage format for timestamps
pub(crate) fn now_rfc3339() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Rowid of the most recent INSERT on this connection
pub(crate) fn last_insert_rowid(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
        "last_insert_rowid()",
    ))
    .first(conn)
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> std::path::PathBuf {
        get_db_path()
    }

    /// Create a new database at a custom path
    pub fn new(path: &str) -> Result<Self> {
        Self::open_at(path)
    }

    /// Open database at default path (respects TATIB_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn get_conn(&self) -> Result<DbConn> {
        self.pool
            .get()
            .map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        // Run raw SQL to create tables if they don't exist
        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                nis TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                class_name TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS violation_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS violation_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                category_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                default_points INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (category_id) REFERENCES violation_categories(id)
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS violations (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                student_id INTEGER NOT NULL,
                type_id INTEGER NOT NULL,
                violation_date TEXT NOT NULL,
                points INTEGER NOT NULL,
                action_taken TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (student_id) REFERENCES students(id),
                FOREIGN KEY (type_id) REFERENCES violation_types(id)
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS student_points (
                student_id INTEGER PRIMARY KEY NOT NULL,
                total INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (student_id) REFERENCES students(id)
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS account_links (
                entity_kind TEXT NOT NULL,
                entity_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (entity_kind, entity_id)
            )
        "#,
        )
        .execute(&mut conn)?;

        // Create indexes
        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_types_category ON violation_types(category_id)",
        )
        .execute(&mut conn)?;
        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_violations_student ON violations(student_id)",
        )
        .execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_violations_type ON violations(type_id)")
            .execute(&mut conn)?;
        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_violations_date ON violations(violation_date)",
        )
        .execute(&mut conn)?;

        // Register current schema
        self.register_schema(&CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, schema: &LedgerSchema) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();
        let features_json = serde_json::to_string(&schema.features).unwrap_or_default();
        let version = schema.version_string();

        let new_schema = NewSchemaVersion {
            version: &version,
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(&mut conn)?;

        Ok(())
    }
}
