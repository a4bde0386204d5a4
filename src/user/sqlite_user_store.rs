use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, open_versioned_in_memory, Column, ForeignKey, ForeignKeyOnChange, SqlType,
    Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use crate::user::*;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, SystemTime},
};
use tracing::debug;

use super::auth::CredentialHasher;

const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
    unique_constraints: &[],
};

const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_user", "user_id")],
    unique_constraints: &[],
};

const USER_PASSWORD_CREDENTIALS_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_tried", &SqlType::Integer),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USER_TABLE_V_0,
        AUTH_TOKEN_TABLE_V_0,
        USER_PASSWORD_CREDENTIALS_V_0,
    ],
    migration: None,
}];

fn system_time_from_column(value: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(value.max(0) as u64)
}

fn system_time_to_column(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn auth_token_from_row(row: &Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        user_id: row.get(0)?,
        value: AuthTokenValue(row.get(1)?),
        created: system_time_from_column(row.get(2)?),
        last_used: row.get::<_, Option<i64>>(3)?.map(system_time_from_column),
    })
}

fn actor_from_row(row: &Row) -> rusqlite::Result<Actor> {
    let role_name: String = row.get(2)?;
    let role = UserRole::from_str(&role_name).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("Unknown role {}", role_name).into(),
        )
    })?;
    Ok(Actor {
        user_id: row.get(0)?,
        handle: row.get(1)?,
        role,
    })
}

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_db(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_versioned_in_memory(VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Looks for a `user.db` in the deployment data dir first, then walks up
    /// from the current directory.
    pub fn infer_path() -> Option<PathBuf> {
        let db_data_dir = PathBuf::from("/data/db/user.db");
        if db_data_dir.exists() {
            return Some(db_data_dir);
        }

        let mut current_dir = std::env::current_dir().ok()?;
        loop {
            let candidate = current_dir.join("user.db");
            if candidate.is_file() {
                return Some(candidate);
            }
            current_dir = current_dir.parent()?.to_path_buf();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("User store connection lock poisoned"))
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, user_handle: &str, role: UserRole) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user (handle, role) VALUES (?1, ?2)",
            params![user_handle, role.as_str()],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        let conn = self.lock()?;
        let user_id = conn
            .query_row(
                "SELECT id FROM user WHERE handle = ?1",
                params![user_handle],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    fn get_user(&self, user_id: usize) -> Result<Option<Actor>> {
        let conn = self.lock()?;
        let actor = conn
            .query_row(
                "SELECT id, handle, role FROM user WHERE id = ?1",
                params![user_id],
                actor_from_row,
            )
            .optional()?;
        Ok(actor)
    }

    fn set_user_role(&self, user_id: usize, role: UserRole) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE user SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id],
        )?;
        if updated == 0 {
            return Err(anyhow!("User {} not found", user_id));
        }
        debug!("Set role of user {} to {}", user_id, role);
        Ok(())
    }

    fn get_all_users(&self) -> Result<Vec<Actor>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, handle, role FROM user ORDER BY handle")?;
        let users = stmt
            .query_map([], actor_from_row)?
            .collect::<rusqlite::Result<Vec<Actor>>>()?;
        Ok(users)
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn get_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.lock()?;
        let token = conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM auth_token WHERE value = ?1",
                params![value.0],
                auth_token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let existing = self.get_user_auth_token(token)?;
        if existing.is_some() {
            let conn = self.lock()?;
            conn.execute("DELETE FROM auth_token WHERE value = ?1", params![token.0])?;
        }
        Ok(existing)
    }

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "UPDATE auth_token SET last_used = {} WHERE value = ?1",
                DEFAULT_TIMESTAMP
            ),
            params![token.0],
        )?;
        Ok(())
    }

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO auth_token (user_id, value, created, last_used) VALUES (?1, ?2, ?3, ?4)",
            params![
                token.user_id,
                token.value.0,
                system_time_to_column(token.created),
                token.last_used.map(system_time_to_column),
            ],
        )?;
        Ok(())
    }

    fn get_all_user_auth_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, value, created, last_used FROM auth_token WHERE user_id = (SELECT id FROM user WHERE handle = ?1)",
        )?;
        let tokens = stmt
            .query_map(params![user_handle], auth_token_from_row)?
            .collect::<rusqlite::Result<Vec<AuthToken>>>()?;
        Ok(tokens)
    }
}

impl UserAuthCredentialsStore for SqliteUserStore {
    fn get_user_auth_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        let user_id = match self.get_user_id(user_handle)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let conn = self.lock()?;
        let password_credentials = conn
            .query_row(
                "SELECT user_id, salt, hash, hasher, created, last_tried, last_used FROM user_password_credentials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let hasher_name: String = row.get(3)?;
                    let hasher = CredentialHasher::from_str(&hasher_name).map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            err.into(),
                        )
                    })?;
                    Ok(UsernamePasswordCredentials {
                        user_id: row.get(0)?,
                        salt: row.get(1)?,
                        hash: row.get(2)?,
                        hasher,
                        created: system_time_from_column(row.get::<_, Option<i64>>(4)?.unwrap_or(0)),
                        last_tried: row.get::<_, Option<i64>>(5)?.map(system_time_from_column),
                        last_used: row.get::<_, Option<i64>>(6)?.map(system_time_from_column),
                    })
                },
            )
            .optional()?;

        Ok(Some(UserAuthCredentials {
            user_id,
            username_password: password_credentials,
        }))
    }

    fn update_user_auth_credentials(&self, credentials: UserAuthCredentials) -> Result<()> {
        let conn = self.lock()?;
        let user_id = credentials.user_id;
        match credentials.username_password.as_ref() {
            Some(password_credentials) => {
                conn.execute(
                    "INSERT INTO user_password_credentials (user_id, salt, hash, hasher) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET salt = excluded.salt, hash = excluded.hash, hasher = excluded.hasher",
                    params![
                        user_id,
                        password_credentials.salt,
                        password_credentials.hash,
                        password_credentials.hasher.to_string(),
                    ],
                )?;
            }
            None => {
                conn.execute(
                    "DELETE FROM user_password_credentials WHERE user_id = ?1",
                    params![user_id],
                )?;
            }
        };
        Ok(())
    }
}
