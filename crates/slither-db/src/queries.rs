use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::models::{PermissionRow, UserRow};
use crate::{Database, OptionalExt};

/// Uniqueness violation raised by [`Database::create_user`]. Callers
/// recover it with `anyhow::Error::downcast_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UserConflict {
    #[error("Email already exists")]
    Email,
    #[error("Username already exists")]
    Username,
}

const USER_COLUMNS: &str = "id, email, username, password_hash, display_name, is_active,
     email_verified_at, last_login_at, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a user and its default permission row in one transaction.
    pub fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if query_user(&tx, "email", email)?.is_some() {
                return Err(UserConflict::Email.into());
            }
            if query_user(&tx, "username", username)?.is_some() {
                return Err(UserConflict::Username.into());
            }

            tx.execute(
                "INSERT INTO users (email, username, password_hash, display_name, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
                rusqlite::params![email, username, password_hash, display_name, now],
            )?;
            let user_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO user_permissions (user_id, has_leaderboard_access, has_ad_free_access, created_at, updated_at)
                 VALUES (?1, 0, 0, ?2, ?2)",
                rusqlite::params![user_id, now],
            )?;

            let user = query_user(&tx, "id", &user_id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", user_id))?;
            tx.commit()?;

            info!("New user created: {}", user.username);
            Ok(user)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn record_login(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                rusqlite::params![now, user_id],
            )?;
            Ok(())
        })
    }

    // -- Permissions --

    pub fn get_permissions(&self, user_id: i64) -> Result<Option<PermissionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, has_leaderboard_access, has_ad_free_access
                 FROM user_permissions WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(PermissionRow {
                        user_id: row.get(0)?,
                        has_leaderboard_access: row.get(1)?,
                        has_ad_free_access: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Grant leaderboard access. Returns `false` when the user already had it.
    pub fn grant_leaderboard_access(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_permissions
                 SET has_leaderboard_access = 1, updated_at = ?1
                 WHERE user_id = ?2 AND has_leaderboard_access = 0",
                rusqlite::params![now, user_id],
            )?;
            if changed > 0 {
                info!("User {} purchased leaderboard access", user_id);
            }
            Ok(changed > 0)
        })
    }

    pub fn has_leaderboard_access(&self, user_id: i64) -> Result<bool> {
        Ok(self
            .get_permissions(user_id)?
            .is_some_and(|p| p.has_leaderboard_access))
    }
}

/// `column` is always one of our own literals, never user input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            password_hash: row.get(3)?,
            display_name: row.get(4)?,
            is_active: row.get(5)?,
            email_verified_at: row.get(6)?,
            last_login_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    })
    .optional()
}
