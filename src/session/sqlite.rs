use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use super::{ExerciseId, SessionId, SessionStore};
use crate::config::SessionConfig;
use crate::error::SessionError;

/// ログイン中のユーザー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: i64,
    pub preferred_reps: Option<u32>,
}

impl UserContext {
    pub fn from_config(config: &SessionConfig) -> Option<Self> {
        config.user_id.map(|user_id| Self {
            user_id,
            preferred_reps: config.preferred_reps,
        })
    }
}

/// SQLite によるセッション記録
pub struct SqliteSessionStore {
    conn: Connection,
    user: Option<UserContext>,
}

impl SqliteSessionStore {
    pub fn open<P: AsRef<Path>>(path: P, user: Option<UserContext>) -> Result<Self, SessionError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn, user };
        store.init_schema()?;
        info!("session database opened: {}", path.as_ref().display());
        Ok(store)
    }

    pub fn in_memory(user: Option<UserContext>) -> Result<Self, SessionError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            user,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SessionError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_date TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                notes TEXT
            );
            CREATE TABLE IF NOT EXISTS exercises (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                default_repetitions INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS session_exercises (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                exercise_id INTEGER NOT NULL,
                total_reps INTEGER NOT NULL,
                incorrect_reps INTEGER NOT NULL,
                error_type TEXT,
                FOREIGN KEY(session_id) REFERENCES sessions(id),
                FOREIGN KEY(exercise_id) REFERENCES exercises(id)
            );",
        )?;
        Ok(())
    }

    pub fn user(&self) -> Option<UserContext> {
        self.user
    }

    fn require_user(&self) -> Result<UserContext, SessionError> {
        self.user.ok_or(SessionError::NotLoggedIn)
    }

    fn require_session(&self, session: SessionId) -> Result<(), SessionError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sessions WHERE id = ?1",
                params![session.0],
                |row| row.get(0),
            )
            .optional()?;
        found.map(|_| ()).ok_or(SessionError::NoActiveSession)
    }
}

impl SessionStore for SqliteSessionStore {
    fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    fn preferred_repetition_count(&self) -> Option<u32> {
        self.user.and_then(|u| u.preferred_reps)
    }

    fn create_session(&mut self) -> Result<SessionId, SessionError> {
        let user = self.require_user()?;
        self.conn.execute(
            "INSERT INTO sessions (user_id, session_date, completed) VALUES (?1, datetime('now'), 0)",
            params![user.user_id],
        )?;
        let id = SessionId(self.conn.last_insert_rowid());
        info!("session {} created for user {}", id.0, user.user_id);
        Ok(id)
    }

    fn exercise_id(&mut self, name: &str, default_reps: u32) -> Result<ExerciseId, SessionError> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM exercises WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(ExerciseId(id));
        }

        self.conn.execute(
            "INSERT INTO exercises (name, default_repetitions) VALUES (?1, ?2)",
            params![name, default_reps],
        )?;
        debug!("exercise '{}' registered", name);
        Ok(ExerciseId(self.conn.last_insert_rowid()))
    }

    fn record_exercise(
        &mut self,
        session: SessionId,
        exercise: ExerciseId,
        total_reps: u32,
        incorrect_reps: u32,
        error_note: &str,
    ) -> Result<(), SessionError> {
        self.require_session(session)?;
        self.conn.execute(
            "INSERT INTO session_exercises
             (session_id, exercise_id, total_reps, incorrect_reps, error_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session.0, exercise.0, total_reps, incorrect_reps, error_note],
        )?;
        Ok(())
    }

    fn complete_session(&mut self, session: SessionId, notes: Option<&str>) -> Result<(), SessionError> {
        let updated = match notes {
            Some(notes) => self.conn.execute(
                "UPDATE sessions SET completed = 1, notes = ?2 WHERE id = ?1",
                params![session.0, notes],
            )?,
            None => self.conn.execute(
                "UPDATE sessions SET completed = 1 WHERE id = ?1",
                params![session.0],
            )?,
        };
        if updated == 0 {
            return Err(SessionError::NoActiveSession);
        }
        info!("session {} completed", session.0);
        Ok(())
    }
}
