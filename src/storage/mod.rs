//! SQLite persistence. Every query is scoped to the calling user; child rows
//! are authorised by walking up to their owning workout or session.

mod sessions;
mod workouts;

use crate::domain::error::{StoreError, StoreResult};
use crate::domain::fitness::{ParseEnumError, UserSettings};
use crate::domain::models::UserId;
use crate::domain::ports::{Authenticator, SettingsStore};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Params, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS api_tokens (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS user_settings (
    user_id TEXT PRIMARY KEY,
    system_instructions TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS exercises (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    category TEXT NOT NULL DEFAULT 'strength'
        CHECK (category IN ('strength', 'cardio', 'flexibility', 'balance', 'sports')),
    instructions TEXT,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS workouts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    summary TEXT,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS workout_days (
    id TEXT PRIMARY KEY,
    workout_id TEXT NOT NULL REFERENCES workouts(id),
    dow TEXT NOT NULL CHECK (dow IN ('Mon', 'Tue', 'Wed', 'Thu', 'Fri', 'Sat', 'Sun')),
    position INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS workout_groups (
    id TEXT PRIMARY KEY,
    workout_day_id TEXT NOT NULL REFERENCES workout_days(id),
    name TEXT NOT NULL,
    group_type TEXT NOT NULL CHECK (group_type IN ('single', 'superset', 'triset', 'circuit')),
    rest_seconds INTEGER CHECK (rest_seconds >= 0),
    position INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS workout_items (
    id TEXT PRIMARY KEY,
    workout_group_id TEXT NOT NULL REFERENCES workout_groups(id),
    exercise_id TEXT NOT NULL REFERENCES exercises(id),
    position INTEGER NOT NULL DEFAULT 1,
    target_sets INTEGER CHECK (target_sets >= 0),
    target_reps INTEGER CHECK (target_reps >= 0),
    target_weight REAL CHECK (target_weight >= 0),
    rest_seconds_override INTEGER CHECK (rest_seconds_override >= 0),
    notes TEXT,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    workout_id TEXT NOT NULL REFERENCES workouts(id),
    name TEXT NOT NULL,
    start_date TEXT NOT NULL,
    duration_weeks INTEGER NOT NULL CHECK (duration_weeks >= 0),
    is_active INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    workout_id TEXT REFERENCES workouts(id),
    plan_id TEXT REFERENCES plans(id),
    title TEXT NOT NULL,
    day_dow TEXT CHECK (day_dow IN ('Mon', 'Tue', 'Wed', 'Thu', 'Fri', 'Sat', 'Sun')),
    started_at TEXT NOT NULL,
    finished_at TEXT,
    total_volume REAL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_groups (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    group_type TEXT NOT NULL CHECK (group_type IN ('single', 'superset', 'triset', 'circuit')),
    rest_seconds INTEGER,
    position INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_items (
    id TEXT PRIMARY KEY,
    session_group_id TEXT NOT NULL REFERENCES session_groups(id) ON DELETE CASCADE,
    exercise_name TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 1,
    target_sets INTEGER,
    target_reps INTEGER,
    target_weight REAL,
    rest_seconds INTEGER,
    notes TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS completed_sets (
    id TEXT PRIMARY KEY,
    session_item_id TEXT NOT NULL REFERENCES session_items(id) ON DELETE CASCADE,
    set_number INTEGER NOT NULL CHECK (set_number >= 0),
    weight REAL NOT NULL CHECK (weight >= 0),
    reps INTEGER NOT NULL CHECK (reps >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (session_item_id, set_number)
);

CREATE INDEX IF NOT EXISTS idx_workouts_user ON workouts(user_id, updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_exercises_user ON exercises(user_id, name);
CREATE INDEX IF NOT EXISTS idx_workout_days_workout ON workout_days(workout_id);
CREATE INDEX IF NOT EXISTS idx_workout_groups_day ON workout_groups(workout_day_id);
CREATE INDEX IF NOT EXISTS idx_workout_items_group ON workout_items(workout_group_id);
CREATE INDEX IF NOT EXISTS idx_plans_user ON plans(user_id, start_date DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, started_at DESC);
CREATE INDEX IF NOT EXISTS idx_session_groups_session ON session_groups(session_id);
CREATE INDEX IF NOT EXISTS idx_session_items_group ON session_items(session_group_id);
CREATE INDEX IF NOT EXISTS idx_completed_sets_item ON completed_sets(session_item_id);
";

pub struct Storage {
    db: Mutex<Connection>,
}

impl Storage {
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection(e.to_string()))?;
        }

        let db = Connection::open(db_path)?;
        info!(path = %db_path.display(), "Opened trainer database");
        Self::init(db)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> StoreResult<Self> {
        db.execute("PRAGMA foreign_keys = ON", [])?;
        db.execute_batch(SCHEMA)?;
        Ok(Storage { db: Mutex::new(db) })
    }

    pub(crate) fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| StoreError::Connection(format!("database lock poisoned: {}", e)))
    }

    /// Creates a new bearer token for `user`.
    pub fn issue_token(&self, user: UserId) -> StoreResult<String> {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.conn()?.execute(
            "INSERT INTO api_tokens (token, user_id) VALUES (?1, ?2)",
            params![token, user.to_string()],
        )?;
        Ok(token)
    }

    pub fn revoke_token(&self, token: &str) -> StoreResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM api_tokens WHERE token = ?1", params![token])?;
        Ok(removed > 0)
    }
}

impl Authenticator for Storage {
    fn authenticate(&self, token: &str) -> StoreResult<Option<UserId>> {
        let user: Option<String> = self
            .conn()?
            .query_row(
                "SELECT user_id FROM api_tokens WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;

        user.map(|raw| {
            Uuid::parse_str(&raw)
                .map(UserId)
                .map_err(|e| StoreError::Other(format!("corrupt token owner: {}", e)))
        })
        .transpose()
    }
}

impl SettingsStore for Storage {
    fn get_settings(&self, user: UserId) -> StoreResult<UserSettings> {
        let settings = self
            .conn()?
            .query_row(
                "SELECT system_instructions, updated_at FROM user_settings WHERE user_id = ?1",
                params![user.to_string()],
                |row| {
                    Ok(UserSettings {
                        user_id: user,
                        system_instructions: row.get(0)?,
                        updated_at: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(settings.unwrap_or(UserSettings {
            user_id: user,
            system_instructions: None,
            updated_at: None,
        }))
    }

    fn update_settings(&self, user: UserId, system_instructions: Option<String>) -> StoreResult<UserSettings> {
        let now = now();
        self.conn()?.execute(
            "INSERT INTO user_settings (user_id, system_instructions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                system_instructions = excluded.system_instructions,
                updated_at = excluded.updated_at",
            params![user.to_string(), system_instructions, now],
        )?;
        self.get_settings(user)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("Record".to_string()),
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => StoreError::ConstraintViolation(err.to_string()),
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied => {
                    StoreError::PermissionDenied(err.to_string())
                }
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase => StoreError::Connection(err.to_string()),
                _ => StoreError::Other(err.to_string()),
            },
            _ => StoreError::Other(err.to_string()),
        }
    }
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn today() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        Uuid::parse_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn user_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<UserId> {
    uuid_col(row, idx).map(UserId)
}

pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn fetch_one<T, P, F>(conn: &Connection, sql: &str, params: P, entity: &str, map: F) -> StoreResult<T>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(sql, params, map)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(entity.to_string()))
}

pub(crate) fn fetch_all<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> StoreResult<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

/// Fails with `NotFound(entity)` unless `sql` yields a row.
pub(crate) fn require<P: Params>(conn: &Connection, sql: &str, params: P, entity: &str) -> StoreResult<()> {
    let found: Option<i64> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
    found
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(entity.to_string()))
}

/// Column assignments for a partial UPDATE. `updated_at` is always bumped.
#[derive(Default)]
pub(crate) struct Assignments {
    columns: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl Assignments {
    pub(crate) fn set_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) {
        if let Some(value) = value {
            self.columns.push(column);
            self.values.push(value.into());
        }
    }

    pub(crate) fn apply(mut self, conn: &Connection, table: &'static str, id: Uuid) -> StoreResult<usize> {
        let mut sets: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let n = self.columns.len();
        sets.push(format!("updated_at = ?{}", n + 1));
        let sql = format!("UPDATE {} SET {} WHERE id = ?{}", table, sets.join(", "), n + 2);

        self.values.push(SqlValue::Text(now()));
        self.values.push(SqlValue::Text(id.to_string()));
        Ok(conn.execute(&sql, params_from_iter(self.values.iter()))?)
    }
}

pub(crate) fn soft_delete(conn: &Connection, table: &'static str, id: Uuid) -> StoreResult<()> {
    let sql = format!(
        "UPDATE {} SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        table
    );
    conn.execute(&sql, params![now(), id.to_string()])?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("trainer.db");
        Storage::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("trainer.db");
        let owner = user();

        let token = Storage::open(&db_path).unwrap().issue_token(owner).unwrap();
        let reopened = Storage::open(&db_path).unwrap();
        assert_eq!(reopened.authenticate(&token).unwrap(), Some(owner));
    }

    #[test]
    fn test_token_lifecycle() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();
        let token = storage.issue_token(owner).unwrap();

        assert_eq!(token.len(), 64);
        assert_eq!(storage.authenticate(&token).unwrap(), Some(owner));
        assert_eq!(storage.authenticate("bogus").unwrap(), None);

        assert!(storage.revoke_token(&token).unwrap());
        assert_eq!(storage.authenticate(&token).unwrap(), None);
    }

    #[test]
    fn test_settings_default_and_upsert() {
        let storage = Storage::open_in_memory().unwrap();
        let owner = user();

        let empty = storage.get_settings(owner).unwrap();
        assert!(empty.system_instructions.is_none());

        storage
            .update_settings(owner, Some("Use metric units".to_string()))
            .unwrap();
        let saved = storage
            .update_settings(owner, Some("Prefer supersets".to_string()))
            .unwrap();
        assert_eq!(saved.system_instructions.as_deref(), Some("Prefer supersets"));

        // Settings never leak across users
        assert!(storage.get_settings(user()).unwrap().system_instructions.is_none());
    }

    #[test]
    fn test_error_categories() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.conn().unwrap();

        let missing = conn
            .query_row("SELECT 1 FROM workouts WHERE id = 'x'", [], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(matches!(StoreError::from(missing), StoreError::NotFound(_)));

        let violation = conn
            .execute(
                "INSERT INTO workouts (id, user_id, name, updated_at) VALUES ('a', 'u', '  ', 'now')",
                [],
            )
            .unwrap_err();
        assert!(matches!(
            StoreError::from(violation),
            StoreError::ConstraintViolation(_)
        ));
    }
}
