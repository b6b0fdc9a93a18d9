//! `SQLite` schema definitions for plantlog.
//!
//! The `profiles`, `plants` and `observations` tables mirror the hosted
//! schema column for column; `users` and `sessions` back the local auth
//! provider.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_salt TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the sessions table.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
)
";

/// SQL statement to create the profiles table.
pub const CREATE_PROFILES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    full_name TEXT,
    role TEXT NOT NULL DEFAULT 'student'
)
";

/// SQL statement to create the plants table.
pub const CREATE_PLANTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS plants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    species TEXT NOT NULL,
    assigned_to TEXT NOT NULL REFERENCES profiles(id),
    assigned_by TEXT REFERENCES profiles(id),
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the observations table.
pub const CREATE_OBSERVATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plant_id INTEGER NOT NULL REFERENCES plants(id),
    student_id TEXT NOT NULL REFERENCES profiles(id),
    flower_color TEXT,
    flower_size TEXT,
    petals_count REAL,
    notes TEXT,
    photo_url TEXT,
    plant_height REAL,
    plant_spread REAL,
    branch_number REAL,
    node_number REAL,
    leaf_number REAL,
    leaf_area REAL,
    flower_count REAL,
    flower_diameter REAL,
    plant_age REAL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to index sessions by expiry for pruning.
pub const CREATE_SESSION_EXPIRY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)
";

/// SQL statement to index plants by assignee.
pub const CREATE_PLANT_ASSIGNEE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_plants_assigned_to ON plants(assigned_to)
";

/// SQL statement to index observations by student.
pub const CREATE_OBSERVATION_STUDENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_observations_student ON observations(student_id, created_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";
