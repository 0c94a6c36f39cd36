//! Login account linking
//!
//! A student, parent, guardian or employee may link to at most one login
//! account, and an account belongs to at most one entity. The pairing lives
//! in a single table keyed by `(entity_kind, entity_id)` with a unique
//! constraint on `account_id`; the second link attempt for either side
//! reports a conflict.

use crate::db::{now_rfc3339, AccountLink, Database, DbError, NewAccountLink, Result};
use crate::schema::account_links;
use diesel::prelude::*;

/// Which master-data entity an account link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    Parent,
    Guardian,
    Employee,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Parent => "parent",
            EntityKind::Guardian => "guardian",
            EntityKind::Employee => "employee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(EntityKind::Student),
            "parent" => Some(EntityKind::Parent),
            "guardian" => Some(EntityKind::Guardian),
            "employee" => Some(EntityKind::Employee),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Database {
    /// Link an entity to a login account.
    ///
    /// Fails with `Conflict` if the entity already has an account or the
    /// account is already taken by another entity.
    pub fn link_account(&self, kind: EntityKind, entity_id: i32, account_id: i32) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();

        let link = NewAccountLink {
            entity_kind: kind.as_str(),
            entity_id,
            account_id,
            created_at: &now,
        };

        diesel::insert_into(account_links::table)
            .values(&link)
            .execute(&mut conn)?;
        Ok(())
    }

    /// Remove an entity's account link
    pub fn unlink_account(&self, kind: EntityKind, entity_id: i32) -> Result<()> {
        let mut conn = self.get_conn()?;
        let deleted = diesel::delete(
            account_links::table
                .filter(account_links::entity_kind.eq(kind.as_str()))
                .filter(account_links::entity_id.eq(entity_id)),
        )
        .execute(&mut conn)?;

        if deleted == 0 {
            return Err(DbError::NotFound(format!(
                "No account link for {} {}",
                kind, entity_id
            )));
        }
        Ok(())
    }

    /// The account linked to an entity, if any
    pub fn account_for(&self, kind: EntityKind, entity_id: i32) -> Result<Option<AccountLink>> {
        let mut conn = self.get_conn()?;
        let link = account_links::table
            .filter(account_links::entity_kind.eq(kind.as_str()))
            .filter(account_links::entity_id.eq(entity_id))
            .first::<AccountLink>(&mut conn)
            .optional()?;
        Ok(link)
    }
}
