use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use rusqlite::Connection;

pub const RESULT_TABLE_V_0: Table = Table {
    name: "result",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("student_id", &SqlType::Integer, non_null = true),
        sqlite_column!("course_id", &SqlType::Text, non_null = true),
        sqlite_column!("session", &SqlType::Text, non_null = true),
        sqlite_column!("ca", &SqlType::Real, non_null = true),
        sqlite_column!("exam", &SqlType::Real, non_null = true),
        sqlite_column!("final_score", &SqlType::Real),
        sqlite_column!("grade", &SqlType::Text),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!("revision", &SqlType::Integer, non_null = true),
        sqlite_column!("lecturer_id", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_result_state", "state"),
        ("idx_result_course_session", "course_id, session"),
    ],
    unique_constraints: &[&["student_id", "course_id", "session"]],
};

pub const RESULT_TRANSITION_TABLE_V_0: Table = Table {
    name: "result_transition",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "result_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "result",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Restrict,
            })
        ),
        sqlite_column!("from_state", &SqlType::Text, non_null = true),
        sqlite_column!("to_state", &SqlType::Text, non_null = true),
        sqlite_column!("actor_id", &SqlType::Integer, non_null = true),
        sqlite_column!("actor_role", &SqlType::Text, non_null = true),
        sqlite_column!("revision", &SqlType::Integer, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
    ],
    indices: &[("idx_result_transition_result", "result_id")],
    unique_constraints: &[],
};

pub const RESULT_SCORE_REVISION_TABLE_V_1: Table = Table {
    name: "result_score_revision",
    columns: &[
        sqlite_column!(
            "result_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "result",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Restrict,
            })
        ),
        sqlite_column!("revision", &SqlType::Integer, non_null = true),
        sqlite_column!("ca", &SqlType::Real, non_null = true),
        sqlite_column!("exam", &SqlType::Real, non_null = true),
        sqlite_column!("actor_id", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["result_id", "revision"]],
};

/// Version 0 overwrote scores in place; version 1 keeps every score version.
/// Existing results get their current scores as the only known version.
fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    RESULT_SCORE_REVISION_TABLE_V_1.create(conn)?;
    conn.execute(
        "INSERT INTO result_score_revision (result_id, revision, ca, exam, actor_id, created_at)
         SELECT id, revision, ca, exam, lecturer_id, updated_at FROM result",
        [],
    )
    .context("Failed to backfill score revisions")?;
    Ok(())
}

pub const RESULTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[RESULT_TABLE_V_0, RESULT_TRANSITION_TABLE_V_0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            RESULT_TABLE_V_0,
            RESULT_TRANSITION_TABLE_V_0,
            RESULT_SCORE_REVISION_TABLE_V_1,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];
