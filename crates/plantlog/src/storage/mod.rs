//! Storage layer for plantlog.
//!
//! This module provides `SQLite`-based persistent storage for accounts,
//! sessions, profiles, plant assignments and observations, a filesystem
//! object store for photos, and [`LocalBackend`], which exposes both through
//! the [`crate::backend`] traits.

pub mod blobs;
pub mod local;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ObservationQuery, PlantQuery, ProfileQuery};
use crate::error::{Error, Result};
use crate::model::{
    CurrentUser, Measurements, NewObservation, NewPlant, Observation, Plant, Profile, Role, User,
};

pub use blobs::FsBlobs;
pub use local::LocalBackend;

const OBSERVATION_COLUMNS: &str = r"
    id, plant_id, student_id, flower_color, flower_size, notes, photo_url,
    plant_height, plant_spread, branch_number, node_number, leaf_number,
    leaf_area, flower_count, flower_diameter, plant_age, petals_count, created_at
";

const PLANT_SELECT: &str = r"
    SELECT p.id, p.name, p.species, p.assigned_to, p.assigned_by, p.created_at,
           student.full_name, teacher.full_name
    FROM plants p
    LEFT JOIN profiles student ON student.id = p.assigned_to
    LEFT JOIN profiles teacher ON teacher.id = p.assigned_by
";

/// Stored password material for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The account.
    pub user: User,
    /// Per-account salt.
    pub salt: String,
    /// Hex digest of salt and password.
    pub hash: String,
}

/// Storage engine for plantlog records.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Accounts with their profiles, created atomically
/// - Bearer sessions with expiry
/// - Plant assignments and observations, filtered and newest first
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&mut conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&mut conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Accounts ===

    /// Create an account together with its profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailTaken`] if the email is already registered.
    pub fn create_user(
        &mut self,
        email: &str,
        salt: &str,
        hash: &str,
        full_name: Option<&str>,
        role: Role,
    ) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            created_at: Utc::now(),
        };

        let tx = self.conn.transaction()?;
        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            [email],
            |row| row.get(0),
        )?;
        if taken {
            return Err(Error::EmailTaken);
        }

        tx.execute(
            r"
            INSERT INTO users (id, email, password_salt, password_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                user.id.to_string(),
                user.email,
                salt,
                hash,
                timestamp(user.created_at)
            ],
        )?;
        tx.execute(
            "INSERT INTO profiles (id, full_name, role) VALUES (?1, ?2, ?3)",
            params![user.id.to_string(), full_name, role.as_str()],
        )?;
        tx.commit()?;

        debug!("Created user {} with role {}", user.id, role);
        Ok(user)
    }

    /// Look up the stored credentials for an email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn credentials(&self, email: &str) -> Result<Option<Credentials>> {
        let result = self
            .conn
            .query_row(
                r"
                SELECT id, email, created_at, password_salt, password_hash
                FROM users WHERE email = ?1
                ",
                [email],
                |row| {
                    Ok(Credentials {
                        user: User {
                            id: parse_uuid(row, 0)?,
                            email: row.get(1)?,
                            created_at: parse_timestamp(row, 2)?,
                        },
                        salt: row.get(3)?,
                        hash: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    // === Sessions ===

    /// Store a session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                token,
                user_id.to_string(),
                timestamp(Utc::now()),
                timestamp(expires_at)
            ],
        )?;
        Ok(())
    }

    /// Delete a session, returning the account it belonged to.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_session(&self, token: &str) -> Result<Option<Uuid>> {
        let user_id = self
            .conn
            .query_row(
                "DELETE FROM sessions WHERE token = ?1 RETURNING user_id",
                [token],
                |row| parse_uuid(row, 0),
            )
            .optional()?;
        Ok(user_id)
    }

    /// Resolve a session token that is still valid at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn session_user(&self, token: &str, now: DateTime<Utc>) -> Result<Option<CurrentUser>> {
        let result = self
            .conn
            .query_row(
                r"
                SELECT u.id, u.email, p.role
                FROM sessions s
                JOIN users u ON u.id = s.user_id
                JOIN profiles p ON p.id = u.id
                WHERE s.token = ?1 AND s.expires_at > ?2
                ",
                params![token, timestamp(now)],
                |row| {
                    Ok(CurrentUser {
                        id: parse_uuid(row, 0)?,
                        email: row.get(1)?,
                        role: parse_role(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Delete sessions that expired before `now`.
    ///
    /// Returns the number of sessions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            [timestamp(now)],
        )?;

        if affected > 0 {
            info!("Pruned {} expired sessions", affected);
        }
        Ok(affected)
    }

    // === Profiles ===

    /// Get a profile by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, full_name, role FROM profiles WHERE id = ?1",
                [id.to_string()],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(result)
    }

    /// List profiles, ordered by full name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn profiles(&self, query: ProfileQuery) -> Result<Vec<Profile>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, full_name, role FROM profiles
            WHERE (?1 IS NULL OR role = ?1)
            ORDER BY full_name ASC, id ASC
            ",
        )?;

        let role = query.role.map(Role::as_str);
        let profiles = stmt
            .query_map([role], Self::row_to_profile)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(profiles)
    }

    /// Change a profile's role, returning the updated profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Profile>> {
        let affected = self.conn.execute(
            "UPDATE profiles SET role = ?1 WHERE id = ?2",
            params![role.as_str(), id.to_string()],
        )?;

        if affected == 0 {
            return Ok(None);
        }
        info!("Role of {} set to {}", id, role);
        self.profile(id)
    }

    // === Plants ===

    /// Store a plant assignment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the student or teacher profile does not
    /// exist.
    pub fn insert_plant(&self, plant: &NewPlant) -> Result<Plant> {
        for id in [plant.assigned_to, plant.assigned_by] {
            if self.profile(id)?.is_none() {
                return Err(Error::not_found("profile", id));
            }
        }

        self.conn.execute(
            r"
            INSERT INTO plants (name, species, assigned_to, assigned_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                plant.name,
                plant.species,
                plant.assigned_to.to_string(),
                plant.assigned_by.to_string(),
                timestamp(Utc::now()),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted plant with id {}", id);
        self.plant(id)?
            .ok_or_else(|| Error::internal(format!("plant {id} vanished after insert")))
    }

    /// Get a plant by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn plant(&self, id: i64) -> Result<Option<Plant>> {
        let result = self
            .conn
            .query_row(
                &format!("{PLANT_SELECT} WHERE p.id = ?1"),
                [id],
                Self::row_to_plant,
            )
            .optional()?;
        Ok(result)
    }

    /// List plants, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn plants(&self, query: PlantQuery) -> Result<Vec<Plant>> {
        let mut stmt = self.conn.prepare(&format!(
            r"{PLANT_SELECT}
            WHERE (?1 IS NULL OR p.assigned_to = ?1)
              AND (?2 IS NULL OR p.assigned_by = ?2)
            ORDER BY p.created_at DESC, p.id DESC
            "
        ))?;

        let plants = stmt
            .query_map(
                params![
                    query.assigned_to.map(|id| id.to_string()),
                    query.assigned_by.map(|id| id.to_string())
                ],
                Self::row_to_plant,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(plants)
    }

    // === Observations ===

    /// Store an observation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the plant does not exist.
    pub fn insert_observation(&self, observation: &NewObservation) -> Result<Observation> {
        if self.plant(observation.plant_id)?.is_none() {
            return Err(Error::not_found("plant", observation.plant_id));
        }

        let m = &observation.measurements;
        self.conn.execute(
            r"
            INSERT INTO observations (
                plant_id, student_id, flower_color, flower_size, notes, photo_url,
                plant_height, plant_spread, branch_number, node_number, leaf_number,
                leaf_area, flower_count, flower_diameter, plant_age, petals_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ",
            params![
                observation.plant_id,
                observation.student_id.to_string(),
                observation.flower_color,
                observation.flower_size,
                observation.notes,
                observation.photo_url,
                m.plant_height,
                m.plant_spread,
                m.branch_number,
                m.node_number,
                m.leaf_number,
                m.leaf_area,
                m.flower_count,
                m.flower_diameter,
                m.plant_age,
                m.petals_count,
                timestamp(Utc::now()),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted observation with id {}", id);
        self.observation(id)?
            .ok_or_else(|| Error::internal(format!("observation {id} vanished after insert")))
    }

    /// Get an observation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn observation(&self, id: i64) -> Result<Option<Observation>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = ?1"),
                [id],
                Self::row_to_observation,
            )
            .optional()?;
        Ok(result)
    }

    /// List observations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn observations(&self, query: ObservationQuery) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {OBSERVATION_COLUMNS} FROM observations
            WHERE (?1 IS NULL OR student_id = ?1)
              AND (?2 IS NULL OR plant_id = ?2)
            ORDER BY created_at DESC, id DESC
            "
        ))?;

        let observations = stmt
            .query_map(
                params![query.student_id.map(|id| id.to_string()), query.plant_id],
                Self::row_to_observation,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(observations)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (users, plants, observations, active_sessions): (i64, i64, i64, i64) =
            self.conn.query_row(
                r"
                SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM plants),
                    (SELECT COUNT(*) FROM observations),
                    (SELECT COUNT(*) FROM sessions WHERE expires_at > ?1)
                ",
                [timestamp(Utc::now())],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT created_at FROM observations ORDER BY created_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let newest_observation = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            users,
            plants,
            observations,
            active_sessions,
            newest_observation,
            db_size_bytes,
        })
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        Ok(Profile {
            id: parse_uuid(row, 0)?,
            full_name: row.get(1)?,
            role: parse_role(row, 2)?,
        })
    }

    fn row_to_plant(row: &rusqlite::Row) -> rusqlite::Result<Plant> {
        let assigned_by: Option<String> = row.get(4)?;
        Ok(Plant {
            id: row.get(0)?,
            name: row.get(1)?,
            species: row.get(2)?,
            assigned_to: parse_uuid(row, 3)?,
            assigned_by: assigned_by.and_then(|s| Uuid::parse_str(&s).ok()),
            created_at: parse_timestamp(row, 5)?,
            assigned_to_name: row.get(6)?,
            assigned_by_name: row.get(7)?,
        })
    }

    fn row_to_observation(row: &rusqlite::Row) -> rusqlite::Result<Observation> {
        Ok(Observation {
            id: row.get(0)?,
            plant_id: row.get(1)?,
            student_id: parse_uuid(row, 2)?,
            flower_color: row.get(3)?,
            flower_size: row.get(4)?,
            notes: row.get(5)?,
            photo_url: row.get(6)?,
            measurements: Measurements {
                plant_height: row.get(7)?,
                plant_spread: row.get(8)?,
                branch_number: row.get(9)?,
                node_number: row.get(10)?,
                leaf_number: row.get(11)?,
                leaf_area: row.get(12)?,
                flower_count: row.get(13)?,
                flower_diameter: row.get(14)?,
                plant_age: row.get(15)?,
                petals_count: row.get(16)?,
            },
            created_at: parse_timestamp(row, 17)?,
        })
    }
}

/// Format a timestamp so that text order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    Ok(DateTime::parse_from_rfc3339(&text).map_or_else(
        |_| {
            warn!("Unparseable timestamp {:?}, using now", text);
            Utc::now()
        },
        |dt| dt.with_timezone(&Utc),
    ))
}

fn parse_role(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Role> {
    let text: String = row.get(idx)?;
    Ok(text.parse().unwrap_or_else(|_| {
        warn!("Unknown role: {}, defaulting to student", text);
        Role::Student
    }))
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Registered accounts.
    pub users: i64,
    /// Plant assignments.
    pub plants: i64,
    /// Recorded observations.
    pub observations: i64,
    /// Sessions that have not expired.
    pub active_sessions: i64,
    /// Timestamp of the newest observation.
    pub newest_observation: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
