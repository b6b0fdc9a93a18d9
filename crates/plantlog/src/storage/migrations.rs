//! Database migration system for plantlog.
//!
//! The schema version lives in the `metadata` table. Each migration runs
//! inside its own transaction together with the version bump, so a failed
//! step leaves the database at the previous version.

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::schema::{
    CREATE_METADATA_TABLE, CREATE_OBSERVATIONS_TABLE, CREATE_OBSERVATION_STUDENT_INDEX,
    CREATE_PLANTS_TABLE, CREATE_PLANT_ASSIGNEE_INDEX, CREATE_PROFILES_TABLE,
    CREATE_SESSIONS_TABLE, CREATE_SESSION_EXPIRY_INDEX, CREATE_USERS_TABLE,
};

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Migration steps, indexed by `version - 1`.
const MIGRATIONS: &[&[&str]] = &[
    // v1: tables
    &[
        CREATE_USERS_TABLE,
        CREATE_SESSIONS_TABLE,
        CREATE_PROFILES_TABLE,
        CREATE_PLANTS_TABLE,
        CREATE_OBSERVATIONS_TABLE,
    ],
    // v2: lookup indexes
    &[
        CREATE_SESSION_EXPIRY_INDEX,
        CREATE_PLANT_ASSIGNEE_INDEX,
        CREATE_OBSERVATION_STUDENT_INDEX,
    ],
];

/// Initialize the database schema.
///
/// Creates the metadata table if needed, then runs every migration newer
/// than the stored version.
///
/// # Errors
///
/// Returns an error if schema creation or migration fails, or if the
/// database was written by a newer version of plantlog.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    conn.execute(CREATE_METADATA_TABLE, [])?;

    let version = get_schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version \
                 {CURRENT_VERSION}"
            ),
        });
    }

    for next in (version + 1)..=CURRENT_VERSION {
        run_migration(conn, next)?;
    }

    Ok(())
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (fresh database).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<String, rusqlite::Error> = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        [VERSION_KEY],
        |row| row.get(0),
    );

    match result {
        Ok(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// Run a specific migration version.
fn run_migration(conn: &mut Connection, version: i32) -> Result<()> {
    let statements = usize::try_from(version - 1)
        .ok()
        .and_then(|index| MIGRATIONS.get(index))
        .ok_or_else(|| Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        })?;

    let tx = conn.transaction()?;
    for statement in *statements {
        tx.execute(statement, [])?;
    }
    set_schema_version(&tx, version)?;
    tx.commit()?;

    tracing::debug!("Applied schema migration v{}", version);
    Ok(())
}
