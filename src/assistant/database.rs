//! Persistent SQLite store for tasks, session state and the chat directory.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::assistant::tasks::{Recurrence, Task, TaskDraft, TIME_FORMAT};

/// Replies kept per user for conversational context.
const HISTORY_LIMIT: i64 = 5;

/// Pending "read it aloud?" question for a user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub waiting_answer: bool,
    pub incoming_text: String,
    pub incoming_from: String,
}

/// A private chat the bot has seen.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub chat_id: i64,
    pub name: String,
    pub is_bot: bool,
}

/// Result of reading the task table. Rows whose stored values no longer
/// decode are left in place and counted, not returned.
#[derive(Debug, Default)]
pub struct TaskScan {
    pub tasks: Vec<Task>,
    pub unreadable: usize,
}

/// Persistent SQLite database for the assistant.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn new() -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("Failed to create in-memory database: {e}"))?;
        Self::with_connection(conn)
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path)
            .map_err(|e| format!("Failed to open database {}: {e}", path.display()))?;
        let db = Self::with_connection(conn)?;

        let (users, tasks) = db.get_counts()?;
        info!("Loaded database from {:?} ({} users, {} tasks)", path, users, tasks);
        Ok(db)
    }

    fn with_connection(conn: Connection) -> Result<Self, String> {
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    /// Scoped session: the guard is released when it goes out of scope,
    /// on success and on error alike.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, String> {
        self.conn.lock().map_err(|_| "database lock poisoned".to_string())
    }

    fn init_schema(&self) -> Result<(), String> {
        let conn = self.lock()?;

        conn.execute_batch(r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                text TEXT NOT NULL,
                start_time TEXT NOT NULL,
                repeat_interval TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS sessions (
                telegram_id TEXT PRIMARY KEY,
                waiting_answer INTEGER NOT NULL DEFAULT 0,
                incoming_text TEXT NOT NULL DEFAULT '',
                incoming_from TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id TEXT NOT NULL,
                text TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                is_bot INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                sender TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks(user_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_text ON tasks(text);
            CREATE INDEX IF NOT EXISTS idx_history_telegram_id ON history(telegram_id);
            CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id);
        "#).map_err(|e| format!("Failed to initialize database schema: {e}"))
    }

    fn get_counts(&self) -> Result<(usize, usize), String> {
        let conn = self.lock()?;
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;
        let tasks: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;
        Ok((users as usize, tasks as usize))
    }

    // ==================== TASK METHODS ====================

    /// Return the user's row id, creating the user if needed.
    pub fn get_or_create_user(&self, telegram_id: &str) -> Result<i64, String> {
        let conn = self.lock()?;
        upsert_user(&conn, telegram_id)
    }

    /// Insert a task under `telegram_id`. The user row and the task commit together.
    pub fn add_task(&self, telegram_id: &str, draft: &TaskDraft) -> Result<i64, String> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| format!("Failed to begin transaction: {e}"))?;

        let user_id = upsert_user(&tx, telegram_id)?;
        tx.execute(
            "INSERT INTO tasks (user_id, text, start_time, repeat_interval) VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                draft.text,
                draft.due_at.format(TIME_FORMAT).to_string(),
                draft.recurrence.as_db()
            ],
        )
        .map_err(|e| format!("Failed to insert task: {e}"))?;
        let task_id = tx.last_insert_rowid();

        tx.commit().map_err(|e| format!("Failed to commit task: {e}"))?;
        info!("Added task #{} for {}: {:?} at {}", task_id, telegram_id, draft.text, draft.due_at);
        Ok(task_id)
    }

    /// All tasks, oldest first. Undecodable rows are skipped.
    pub fn list_tasks(&self) -> Result<Vec<Task>, String> {
        Ok(self.scan_tasks()?.tasks)
    }

    /// All tasks, oldest first, with a count of rows that could not be decoded.
    pub fn scan_tasks(&self) -> Result<TaskScan, String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{TASK_SELECT} ORDER BY t.id"))
            .map_err(|e| format!("Query error: {e}"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, task_from_row(row))))
            .map_err(|e| format!("Query execution error: {e}"))?;
        collect_tasks(rows)
    }

    /// Tasks owned by one user, soonest first. Undecodable rows are skipped.
    pub fn list_tasks_for_user(&self, telegram_id: &str) -> Result<Vec<Task>, String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{TASK_SELECT} WHERE u.telegram_id = ?1 ORDER BY t.start_time, t.id"))
            .map_err(|e| format!("Query error: {e}"))?;
        let rows = stmt
            .query_map(params![telegram_id], |row| Ok((row.get::<_, i64>(0)?, task_from_row(row))))
            .map_err(|e| format!("Query execution error: {e}"))?;
        Ok(collect_tasks(rows)?.tasks)
    }

    pub fn get_task(&self, task_id: i64) -> Result<Option<Task>, String> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{TASK_SELECT} WHERE t.id = ?1"),
            params![task_id],
            task_from_row,
        )
        .optional()
        .map_err(|e| format!("Failed to get task #{task_id}: {e}"))
    }

    /// First task id with exactly this text. Texts are not unique.
    pub fn get_task_id_by_text(&self, text: &str) -> Result<Option<i64>, String> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id FROM tasks WHERE text = ?1 ORDER BY id LIMIT 1",
            params![text],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("Failed to look up task by text: {e}"))
    }

    /// Delete a task. Returns false if it did not exist.
    pub fn delete_task(&self, task_id: i64) -> Result<bool, String> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| format!("Failed to begin transaction: {e}"))?;
        let deleted = tx
            .execute("DELETE FROM tasks WHERE id = ?1", params![task_id])
            .map_err(|e| format!("Failed to delete task #{task_id}: {e}"))?;
        tx.commit().map_err(|e| format!("Failed to commit delete: {e}"))?;
        Ok(deleted > 0)
    }

    /// Move a task's due time. Returns false if it did not exist.
    pub fn reschedule_task(&self, task_id: i64, due_at: NaiveDateTime) -> Result<bool, String> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| format!("Failed to begin transaction: {e}"))?;
        let updated = tx
            .execute(
                "UPDATE tasks SET start_time = ?1 WHERE id = ?2",
                params![due_at.format(TIME_FORMAT).to_string(), task_id],
            )
            .map_err(|e| format!("Failed to reschedule task #{task_id}: {e}"))?;
        tx.commit().map_err(|e| format!("Failed to commit reschedule: {e}"))?;
        Ok(updated > 0)
    }

    // ==================== SESSION METHODS ====================

    pub fn get_session(&self, telegram_id: &str) -> Result<Option<Session>, String> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT waiting_answer, incoming_text, incoming_from FROM sessions WHERE telegram_id = ?1",
            params![telegram_id],
            |row| {
                Ok(Session {
                    waiting_answer: row.get::<_, i64>(0)? != 0,
                    incoming_text: row.get(1)?,
                    incoming_from: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| format!("Failed to load session for {telegram_id}: {e}"))
    }

    pub fn set_session(&self, telegram_id: &str, session: &Session) -> Result<(), String> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (telegram_id, waiting_answer, incoming_text, incoming_from)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(telegram_id) DO UPDATE SET
                waiting_answer = ?2,
                incoming_text = ?3,
                incoming_from = ?4",
            params![
                telegram_id,
                session.waiting_answer as i64,
                session.incoming_text,
                session.incoming_from
            ],
        )
        .map_err(|e| format!("Failed to save session for {telegram_id}: {e}"))?;
        debug!("Saved session for {}", telegram_id);
        Ok(())
    }

    /// Record an assistant reply, keeping only the most recent ones.
    pub fn push_history(&self, telegram_id: &str, text: &str) -> Result<(), String> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| format!("Failed to begin transaction: {e}"))?;
        tx.execute(
            "INSERT INTO history (telegram_id, text) VALUES (?1, ?2)",
            params![telegram_id, text],
        )
        .map_err(|e| format!("Failed to insert history: {e}"))?;
        tx.execute(
            "DELETE FROM history WHERE telegram_id = ?1 AND id NOT IN (
                SELECT id FROM history WHERE telegram_id = ?1 ORDER BY id DESC LIMIT ?2
             )",
            params![telegram_id, HISTORY_LIMIT],
        )
        .map_err(|e| format!("Failed to trim history: {e}"))?;
        tx.commit().map_err(|e| format!("Failed to commit history: {e}"))
    }

    /// Recent assistant replies, newest first.
    pub fn get_history(&self, telegram_id: &str) -> Result<Vec<String>, String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT text FROM history WHERE telegram_id = ?1 ORDER BY id DESC LIMIT ?2")
            .map_err(|e| format!("Query error: {e}"))?;
        let rows = stmt
            .query_map(params![telegram_id, HISTORY_LIMIT], |row| row.get(0))
            .map_err(|e| format!("Query execution error: {e}"))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| format!("Row fetch error: {e}"))
    }

    // ==================== CHAT DIRECTORY ====================

    pub fn record_chat(&self, chat: &ChatEntry, seen_at: &str) -> Result<(), String> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chats (chat_id, name, is_bot, last_seen) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET name = ?2, is_bot = ?3, last_seen = ?4",
            params![chat.chat_id, chat.name, chat.is_bot as i64, seen_at],
        )
        .map_err(|e| format!("Failed to record chat {}: {e}", chat.chat_id))?;
        Ok(())
    }

    /// Known chats, optionally excluding bots.
    pub fn list_chats(&self, include_bots: bool) -> Result<Vec<ChatEntry>, String> {
        let conn = self.lock()?;
        let sql = if include_bots {
            "SELECT chat_id, name, is_bot FROM chats ORDER BY last_seen DESC"
        } else {
            "SELECT chat_id, name, is_bot FROM chats WHERE is_bot = 0 ORDER BY last_seen DESC"
        };
        let mut stmt = conn.prepare(sql).map_err(|e| format!("Query error: {e}"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ChatEntry {
                    chat_id: row.get(0)?,
                    name: row.get(1)?,
                    is_bot: row.get::<_, i64>(2)? != 0,
                })
            })
            .map_err(|e| format!("Query execution error: {e}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| format!("Row fetch error: {e}"))
    }

    pub fn record_message(&self, chat_id: i64, sender: &str, text: &str, timestamp: &str) -> Result<(), String> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (chat_id, sender, text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![chat_id, sender, text, timestamp],
        )
        .map_err(|e| format!("Failed to insert message: {e}"))?;
        Ok(())
    }

    /// Last `limit` message texts from a chat, newest first.
    pub fn recent_messages(&self, chat_id: i64, limit: u32) -> Result<Vec<String>, String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT text FROM messages WHERE chat_id = ?1 ORDER BY id DESC LIMIT ?2")
            .map_err(|e| format!("Query error: {e}"))?;
        let rows = stmt
            .query_map(params![chat_id, limit as i64], |row| row.get(0))
            .map_err(|e| format!("Query execution error: {e}"))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| format!("Row fetch error: {e}"))
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), String> {
        self.lock()?.execute_batch(sql).map_err(|e| e.to_string())
    }
}

const TASK_SELECT: &str = "SELECT t.id, u.telegram_id, t.text, t.start_time, t.repeat_interval, t.created_at
     FROM tasks t JOIN users u ON u.id = t.user_id";

fn upsert_user(conn: &Connection, telegram_id: &str) -> Result<i64, String> {
    conn.execute(
        "INSERT INTO users (telegram_id) VALUES (?1) ON CONFLICT(telegram_id) DO NOTHING",
        params![telegram_id],
    )
    .map_err(|e| format!("Failed to create user {telegram_id}: {e}"))?;
    conn.query_row(
        "SELECT id FROM users WHERE telegram_id = ?1",
        params![telegram_id],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to load user {telegram_id}: {e}"))
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Step errors abort the read. A row that fails to decode is logged and
/// skipped so the rest of the table stays usable.
fn collect_tasks(
    rows: impl Iterator<Item = rusqlite::Result<(i64, rusqlite::Result<Task>)>>,
) -> Result<TaskScan, String> {
    let mut scan = TaskScan::default();
    for row in rows {
        let (task_id, decoded) = row.map_err(|e| format!("Row fetch error: {e}"))?;
        match decoded {
            Ok(task) => scan.tasks.push(task),
            Err(e) => {
                warn!("Skipping unreadable task #{}: {}", task_id, e);
                scan.unreadable += 1;
            }
        }
    }
    Ok(scan)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let due_at: String = row.get(3)?;
    let repeat: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        owner: row.get(1)?,
        text: row.get(2)?,
        due_at: parse_time(3, &due_at)?,
        recurrence: Recurrence::parse(repeat.as_deref()),
        created_at: parse_time(5, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap().and_hms_opt(hour, min, 0).unwrap()
    }

    fn draft(text: &str, due_at: NaiveDateTime, recurrence: Recurrence) -> TaskDraft {
        TaskDraft { text: text.to_string(), due_at, recurrence }
    }

    #[test]
    fn test_add_task_creates_user_once() {
        let db = Database::new().unwrap();
        db.add_task("100", &draft("one", at(10, 0), Recurrence::None)).unwrap();
        db.add_task("100", &draft("two", at(11, 0), Recurrence::Daily)).unwrap();

        let user_a = db.get_or_create_user("100").unwrap();
        let user_b = db.get_or_create_user("100").unwrap();
        assert_eq!(user_a, user_b);
        assert_eq!(db.get_counts().unwrap(), (1, 2));
    }

    #[test]
    fn test_add_task_rolls_back_user_when_task_insert_fails() {
        let db = Database::new().unwrap();
        db.execute_raw(
            "CREATE TRIGGER reject_tasks BEFORE INSERT ON tasks
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let err = db.add_task("999", &draft("never stored", at(10, 0), Recurrence::None)).unwrap_err();
        assert!(err.contains("rejected"), "unexpected error: {err}");
        assert_eq!(db.get_counts().unwrap(), (0, 0));
    }

    #[test]
    fn test_created_at_is_utc() {
        let db = Database::new().unwrap();
        let id = db.add_task("1", &draft("audit", at(10, 0), Recurrence::None)).unwrap();

        let created_at = db.get_task(id).unwrap().unwrap().created_at;
        let drift = chrono::Utc::now().naive_utc() - created_at;
        assert!(drift.num_seconds().abs() < 120, "created_at {created_at} is not UTC");
    }

    #[test]
    fn test_unreadable_rows_are_skipped() {
        let db = Database::new().unwrap();
        let good = db.add_task("1", &draft("good", at(9, 0), Recurrence::None)).unwrap();
        db.execute_raw(
            "INSERT INTO tasks (user_id, text, start_time)
             SELECT id, 'garbled', '2024-12-01T15:30:00.123+03:00' FROM users WHERE telegram_id = '1';",
        )
        .unwrap();

        let scan = db.scan_tasks().unwrap();
        assert_eq!(scan.unreadable, 1);
        assert_eq!(scan.tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![good]);
        assert_eq!(db.list_tasks_for_user("1").unwrap().len(), 1);
        assert_eq!(db.get_counts().unwrap(), (1, 2));
    }

    #[test]
    fn test_get_task_round_trip() {
        let db = Database::new().unwrap();
        let id = db.add_task("42", &draft("Meeting with Oleg", at(15, 30), Recurrence::Weekly)).unwrap();

        let task = db.get_task(id).unwrap().expect("task should exist");
        assert_eq!(task.owner, "42");
        assert_eq!(task.text, "Meeting with Oleg");
        assert_eq!(task.due_at, at(15, 30));
        assert_eq!(task.recurrence, Recurrence::Weekly);
    }

    #[test]
    fn test_missing_task() {
        let db = Database::new().unwrap();
        assert!(db.get_task(999).unwrap().is_none());
        assert!(!db.delete_task(999).unwrap());
        assert!(!db.reschedule_task(999, at(9, 0)).unwrap());
    }

    #[test]
    fn test_duplicate_text_allowed_and_first_match_wins() {
        let db = Database::new().unwrap();
        let first = db.add_task("1", &draft("Water plants", at(9, 0), Recurrence::Daily)).unwrap();
        let second = db.add_task("2", &draft("Water plants", at(10, 0), Recurrence::None)).unwrap();
        assert_ne!(first, second);
        assert_eq!(db.get_task_id_by_text("Water plants").unwrap(), Some(first));
        assert_eq!(db.get_task_id_by_text("Feed cat").unwrap(), None);
    }

    #[test]
    fn test_delete_and_reschedule() {
        let db = Database::new().unwrap();
        let id = db.add_task("1", &draft("Stand-up", at(9, 0), Recurrence::Daily)).unwrap();

        assert!(db.reschedule_task(id, at(9, 0) + Duration::days(1)).unwrap());
        assert_eq!(db.get_task(id).unwrap().unwrap().due_at, at(9, 0) + Duration::days(1));

        assert!(db.delete_task(id).unwrap());
        assert!(db.get_task(id).unwrap().is_none());
        assert!(db.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_list_tasks_for_user_sorted() {
        let db = Database::new().unwrap();
        db.add_task("1", &draft("late", at(18, 0), Recurrence::None)).unwrap();
        db.add_task("1", &draft("early", at(8, 0), Recurrence::None)).unwrap();
        db.add_task("2", &draft("other user", at(7, 0), Recurrence::None)).unwrap();

        let texts: Vec<_> = db
            .list_tasks_for_user("1")
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["early", "late"]);
    }

    #[test]
    fn test_session_round_trip() {
        let db = Database::new().unwrap();
        assert!(db.get_session("1").unwrap().is_none());

        let pending = Session {
            waiting_answer: true,
            incoming_text: "are we still on?".to_string(),
            incoming_from: "Oleg".to_string(),
        };
        db.set_session("1", &pending).unwrap();
        assert_eq!(db.get_session("1").unwrap(), Some(pending));

        db.set_session("1", &Session::default()).unwrap();
        assert!(!db.get_session("1").unwrap().unwrap().waiting_answer);
    }

    #[test]
    fn test_history_keeps_last_five() {
        let db = Database::new().unwrap();
        for i in 0..8 {
            db.push_history("1", &format!("reply {i}")).unwrap();
        }
        db.push_history("2", "someone else").unwrap();

        let history = db.get_history("1").unwrap();
        assert_eq!(history, vec!["reply 7", "reply 6", "reply 5", "reply 4", "reply 3"]);
        assert_eq!(db.get_history("2").unwrap(), vec!["someone else"]);
    }

    #[test]
    fn test_chat_directory() {
        let db = Database::new().unwrap();
        db.record_chat(&ChatEntry { chat_id: 10, name: "Oleg".into(), is_bot: false }, "2024-12-01 10:00:00").unwrap();
        db.record_chat(&ChatEntry { chat_id: 11, name: "WeatherBot".into(), is_bot: true }, "2024-12-01 10:01:00").unwrap();
        db.record_chat(&ChatEntry { chat_id: 10, name: "Oleg Petrov".into(), is_bot: false }, "2024-12-01 10:02:00").unwrap();

        let all = db.list_chats(true).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Oleg Petrov");

        let people = db.list_chats(false).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].chat_id, 10);
    }

    #[test]
    fn test_recent_messages_newest_first() {
        let db = Database::new().unwrap();
        db.record_message(10, "Oleg", "first", "2024-12-01 10:00:00").unwrap();
        db.record_message(10, "Oleg", "second", "2024-12-01 10:01:00").unwrap();
        db.record_message(11, "Anna", "elsewhere", "2024-12-01 10:02:00").unwrap();

        assert_eq!(db.recent_messages(10, 1).unwrap(), vec!["second"]);
        assert_eq!(db.recent_messages(10, 5).unwrap(), vec!["second", "first"]);
    }
}
