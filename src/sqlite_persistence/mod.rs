mod versioned_schema;

pub use versioned_schema::*;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Opens the database at `db_path`, creating it with the latest schema if it
/// does not exist yet. An existing database is validated against the schema
/// matching its stored version and then migrated forward.
pub fn open_versioned_db<P: AsRef<Path>>(
    db_path: P,
    schemas: &[VersionedSchema],
) -> Result<Connection> {
    let db_path = db_path.as_ref();
    let latest = schemas.last().context("No schema versions declared")?;
    if !db_path.exists() {
        info!("Creating database {:?} at version {}", db_path, latest.version);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to create database {:?}", db_path))?;
        latest.create(&conn)?;
        return Ok(conn);
    }

    let conn = Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open database {:?}", db_path))?;
    conn.execute("PRAGMA foreign_keys = ON;", [])?;

    let version = read_schema_version(&conn)?;
    if version >= schemas.len() {
        bail!("Database version {} is too new", version);
    }
    schemas[version]
        .validate(&conn)
        .with_context(|| format!("Database {:?} does not match version {}", db_path, version))?;
    migrate_if_needed(&conn, schemas, version)?;
    Ok(conn)
}

/// Same as [`open_versioned_db`], for a throwaway in-memory database.
pub fn open_versioned_in_memory(schemas: &[VersionedSchema]) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schemas
        .last()
        .context("No schema versions declared")?
        .create(&conn)?;
    Ok(conn)
}

fn read_schema_version(conn: &Connection) -> Result<usize> {
    let stored = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
        .context("Failed to read database version")?;
    let version = stored - BASE_DB_VERSION as i64;
    if version < 0 {
        bail!(
            "Database version {} is too old, does not contain base db version {}",
            stored,
            BASE_DB_VERSION
        );
    }
    Ok(version as usize)
}

fn migrate_if_needed(conn: &Connection, schemas: &[VersionedSchema], version: usize) -> Result<()> {
    let mut latest_from = version;
    for schema in schemas.iter().skip(version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating db from version {} to {}",
                latest_from, schema.version
            );
            migration_fn(conn)?;
        }
        latest_from = schema.version;
    }
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
        [],
    )?;
    Ok(())
}
