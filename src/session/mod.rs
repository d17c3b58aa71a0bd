//! Session collaborator - user context and result persistence

pub mod sqlite;

pub use sqlite::SqliteSessionStore;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExerciseId(pub i64);

/// ログイン中ユーザーとセッション記録の窓口
///
/// 失敗はすべて呼び出し側でログに出すだけで、運動の進行は止めない。
pub trait SessionStore {
    fn is_logged_in(&self) -> bool;

    /// ユーザーが設定した反復回数
    fn preferred_repetition_count(&self) -> Option<u32>;

    fn create_session(&mut self) -> Result<SessionId, SessionError>;

    /// 名前で種目を引く。無ければ `default_reps` で作る
    fn exercise_id(&mut self, name: &str, default_reps: u32) -> Result<ExerciseId, SessionError>;

    fn record_exercise(
        &mut self,
        session: SessionId,
        exercise: ExerciseId,
        total_reps: u32,
        incorrect_reps: u32,
        error_note: &str,
    ) -> Result<(), SessionError>;

    /// `notes` が None ならメモは書き換えない
    fn complete_session(&mut self, session: SessionId, notes: Option<&str>) -> Result<(), SessionError>;
}
