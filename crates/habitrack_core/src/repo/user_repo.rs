//! User repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the per-user document across normalized tables.
//! - Provide field-level merge writes and dedicated append paths.
//!
//! # Invariants
//! - Write paths validate before touching SQL.
//! - `update_user` replaces only the fields present in the patch and never
//!   touches reflections.
//! - Multi-table writes run in one transaction.
//! - Read paths reject corrupt rows instead of masking them.

use crate::db::DbError;
use crate::model::mood::Mood;
use crate::model::user::{
    validate_journal_text, validate_username, ItemEntry, ItemKind, LeaderboardEntry, MoodEntry,
    Reflection, Reminder, Stats, UserPatch, UserRecord, UserValidationError,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for user persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(UserValidationError),
    Db(DbError),
    NotFound(String),
    AlreadyExists(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(username) => write!(f, "user not found: {username}"),
            Self::AlreadyExists(username) => write!(f, "username already exists: {username}"),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::AlreadyExists(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<UserValidationError> for RepoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for user documents.
pub trait UserRepository {
    /// Inserts a new user. Fails with `AlreadyExists` on a taken username.
    fn create_user(&self, user: &UserRecord, password: &str) -> RepoResult<()>;
    fn get_user(&self, username: &str) -> RepoResult<Option<UserRecord>>;
    /// Merges present patch fields into the stored document.
    fn update_user(&self, username: &str, patch: &UserPatch) -> RepoResult<()>;
    /// Plaintext credential comparison.
    fn check_password(&self, username: &str, password: &str) -> RepoResult<bool>;
    /// Inserts the entry, or overwrites only the mood of an existing entry for
    /// the same date. Returns the stored entry.
    fn upsert_mood(&self, username: &str, entry: &MoodEntry) -> RepoResult<MoodEntry>;
    fn append_reflection(&self, username: &str, reflection: &Reflection) -> RepoResult<()>;
    fn update_reflection_text(&self, username: &str, id: Uuid, text: &str) -> RepoResult<()>;
    /// All reflections, newest first.
    fn list_reflections(&self, username: &str) -> RepoResult<Vec<Reflection>>;
    /// Top users by goals, then habits, then streak (all descending).
    fn leaderboard(&self, limit: u32) -> RepoResult<Vec<LeaderboardEntry>>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn user_exists(&self, username: &str) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1);",
            [username],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn require_user(&self, username: &str) -> RepoResult<()> {
        if self.user_exists(username)? {
            Ok(())
        } else {
            Err(RepoError::NotFound(username.to_string()))
        }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, user: &UserRecord, password: &str) -> RepoResult<()> {
        user.validate()?;
        if password.is_empty() {
            return Err(UserValidationError::EmptyPassword.into());
        }
        if self.user_exists(&user.username)? {
            return Err(RepoError::AlreadyExists(user.username.clone()));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO users (username, password, goals_completed, habits_completed, streak)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                user.username,
                password,
                user.stats.goals_completed,
                user.stats.habits_completed,
                user.stats.streak,
            ],
        )?;
        let username = user.username.as_str();
        replace_items(&tx, username, ItemKind::Goal, &user.goals)?;
        replace_items(&tx, username, ItemKind::Habit, &user.habits)?;
        replace_moods(&tx, username, &user.moods)?;
        replace_badges(&tx, username, &user.unlocked_badges)?;
        replace_suggestions(&tx, username, &user.suggestions)?;
        replace_reminders(&tx, username, &user.reminders)?;
        for reflection in &user.reflections {
            insert_reflection(&tx, username, reflection)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, username: &str) -> RepoResult<Option<UserRecord>> {
        let stats = self
            .conn
            .query_row(
                "SELECT goals_completed, habits_completed, streak FROM users WHERE username = ?1;",
                [username],
                |row| {
                    Ok(Stats {
                        goals_completed: row.get(0)?,
                        habits_completed: row.get(1)?,
                        streak: row.get(2)?,
                    })
                },
            )
            .optional()?;
        let Some(stats) = stats else {
            return Ok(None);
        };

        Ok(Some(UserRecord {
            username: username.to_string(),
            goals: load_items(self.conn, username, ItemKind::Goal)?,
            habits: load_items(self.conn, username, ItemKind::Habit)?,
            stats,
            moods: load_moods(self.conn, username)?,
            reflections: self.list_reflections(username)?,
            unlocked_badges: load_strings(
                self.conn,
                "SELECT badge_key FROM unlocked_badges WHERE username = ?1 ORDER BY position;",
                username,
            )?,
            reminders: load_reminders(self.conn, username)?,
            suggestions: load_strings(
                self.conn,
                "SELECT text FROM suggestions WHERE username = ?1 ORDER BY position;",
                username,
            )?,
        }))
    }

    fn update_user(&self, username: &str, patch: &UserPatch) -> RepoResult<()> {
        validate_username(username)?;
        patch.validate()?;
        self.require_user(username)?;

        let tx = self.conn.unchecked_transaction()?;
        if let Some(goals) = &patch.goals {
            replace_items(&tx, username, ItemKind::Goal, goals)?;
        }
        if let Some(habits) = &patch.habits {
            replace_items(&tx, username, ItemKind::Habit, habits)?;
        }
        if let Some(stats) = patch.stats {
            tx.execute(
                "UPDATE users
                 SET goals_completed = ?2, habits_completed = ?3, streak = ?4
                 WHERE username = ?1;",
                params![
                    username,
                    stats.goals_completed,
                    stats.habits_completed,
                    stats.streak
                ],
            )?;
        }
        if let Some(moods) = &patch.moods {
            replace_moods(&tx, username, moods)?;
        }
        if let Some(reminders) = &patch.reminders {
            replace_reminders(&tx, username, reminders)?;
        }
        if let Some(suggestions) = &patch.suggestions {
            replace_suggestions(&tx, username, suggestions)?;
        }
        if let Some(badges) = &patch.unlocked_badges {
            replace_badges(&tx, username, badges)?;
        }
        tx.execute(
            "UPDATE users SET updated_at = (strftime('%s', 'now') * 1000) WHERE username = ?1;",
            [username],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn check_password(&self, username: &str, password: &str) -> RepoResult<bool> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT password FROM users WHERE username = ?1;",
                [username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.as_deref() == Some(password))
    }

    fn upsert_mood(&self, username: &str, entry: &MoodEntry) -> RepoResult<MoodEntry> {
        self.require_user(username)?;
        let date = entry.date.format(DATE_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO moods (username, mood_date, mood, completed_goals, completed_habits)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (username, mood_date) DO UPDATE SET mood = excluded.mood;",
            params![
                username,
                date,
                entry.mood.as_str(),
                entry.completed_goals,
                entry.completed_habits
            ],
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT mood_date, mood, completed_goals, completed_habits
             FROM moods WHERE username = ?1 AND mood_date = ?2;",
        )?;
        let mut rows = stmt.query(params![username, date])?;
        match rows.next()? {
            Some(row) => parse_mood_row(row),
            None => Err(RepoError::InvalidData(format!(
                "mood for {date} missing after upsert"
            ))),
        }
    }

    fn append_reflection(&self, username: &str, reflection: &Reflection) -> RepoResult<()> {
        validate_journal_text(&reflection.text)?;
        self.require_user(username)?;
        insert_reflection(self.conn, username, reflection)
    }

    fn update_reflection_text(&self, username: &str, id: Uuid, text: &str) -> RepoResult<()> {
        validate_journal_text(text)?;
        let changed = self.conn.execute(
            "UPDATE reflections SET text = ?3 WHERE username = ?1 AND reflection_id = ?2;",
            params![username, id.to_string(), text],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidData(format!(
                "reflection {id} not found for {username}"
            )));
        }
        Ok(())
    }

    fn list_reflections(&self, username: &str) -> RepoResult<Vec<Reflection>> {
        let mut stmt = self.conn.prepare(
            "SELECT reflection_id, created_at, text, mood
             FROM reflections
             WHERE username = ?1
             ORDER BY created_at DESC, rowid DESC;",
        )?;
        let mut rows = stmt.query([username])?;
        let mut reflections = Vec::new();
        while let Some(row) = rows.next()? {
            reflections.push(parse_reflection_row(row)?);
        }
        Ok(reflections)
    }

    fn leaderboard(&self, limit: u32) -> RepoResult<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT username, goals_completed, habits_completed, streak
             FROM users
             ORDER BY goals_completed DESC, habits_completed DESC, streak DESC, username ASC
             LIMIT ?1;",
        )?;
        let mut rows = stmt.query([i64::from(limit)])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(LeaderboardEntry {
                username: row.get(0)?,
                stats: Stats {
                    goals_completed: row.get(1)?,
                    habits_completed: row.get(2)?,
                    streak: row.get(3)?,
                },
            });
        }
        Ok(entries)
    }
}

fn replace_items(
    conn: &Connection,
    username: &str,
    kind: ItemKind,
    items: &[ItemEntry],
) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM user_items WHERE username = ?1 AND kind = ?2;",
        params![username, kind.as_db()],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO user_items (username, kind, position, item_id, text, completed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
    )?;
    for (position, item) in items.iter().enumerate() {
        stmt.execute(params![
            username,
            kind.as_db(),
            position as i64,
            item.id.to_string(),
            item.text,
            item.completed,
            item.created_at_ms,
        ])?;
    }
    Ok(())
}

fn replace_moods(conn: &Connection, username: &str, moods: &[MoodEntry]) -> RepoResult<()> {
    conn.execute("DELETE FROM moods WHERE username = ?1;", [username])?;
    let mut stmt = conn.prepare(
        "INSERT INTO moods (username, mood_date, mood, completed_goals, completed_habits)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    for entry in moods {
        stmt.execute(params![
            username,
            entry.date.format(DATE_FORMAT).to_string(),
            entry.mood.as_str(),
            entry.completed_goals,
            entry.completed_habits,
        ])?;
    }
    Ok(())
}

fn replace_badges(conn: &Connection, username: &str, badges: &[String]) -> RepoResult<()> {
    conn.execute("DELETE FROM unlocked_badges WHERE username = ?1;", [username])?;
    let mut stmt = conn.prepare(
        "INSERT INTO unlocked_badges (username, badge_key, position) VALUES (?1, ?2, ?3);",
    )?;
    for (position, key) in badges.iter().enumerate() {
        stmt.execute(params![username, key, position as i64])?;
    }
    Ok(())
}

fn replace_suggestions(
    conn: &Connection,
    username: &str,
    suggestions: &[String],
) -> RepoResult<()> {
    conn.execute("DELETE FROM suggestions WHERE username = ?1;", [username])?;
    let mut stmt =
        conn.prepare("INSERT INTO suggestions (username, position, text) VALUES (?1, ?2, ?3);")?;
    for (position, text) in suggestions.iter().enumerate() {
        stmt.execute(params![username, position as i64, text])?;
    }
    Ok(())
}

fn replace_reminders(conn: &Connection, username: &str, reminders: &[Reminder]) -> RepoResult<()> {
    conn.execute("DELETE FROM reminders WHERE username = ?1;", [username])?;
    let mut stmt = conn.prepare(
        "INSERT INTO reminders (username, position, goal_id, time, active)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    for (position, reminder) in reminders.iter().enumerate() {
        stmt.execute(params![
            username,
            position as i64,
            reminder.goal_id.to_string(),
            reminder.time,
            reminder.active,
        ])?;
    }
    Ok(())
}

fn insert_reflection(conn: &Connection, username: &str, reflection: &Reflection) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO reflections (reflection_id, username, created_at, text, mood)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            reflection.id.to_string(),
            username,
            reflection.created_at_ms,
            reflection.text,
            reflection.mood.map(Mood::as_str),
        ],
    )?;
    Ok(())
}

fn load_items(conn: &Connection, username: &str, kind: ItemKind) -> RepoResult<Vec<ItemEntry>> {
    let mut stmt = conn.prepare(
        "SELECT item_id, text, completed, created_at
         FROM user_items
         WHERE username = ?1 AND kind = ?2
         ORDER BY position;",
    )?;
    let mut rows = stmt.query(params![username, kind.as_db()])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(ItemEntry {
            id: parse_uuid(row, "item_id")?,
            text: row.get("text")?,
            completed: row.get("completed")?,
            created_at_ms: row.get("created_at")?,
        });
    }
    Ok(items)
}

fn load_moods(conn: &Connection, username: &str) -> RepoResult<Vec<MoodEntry>> {
    let mut stmt = conn.prepare(
        "SELECT mood_date, mood, completed_goals, completed_habits
         FROM moods WHERE username = ?1 ORDER BY mood_date;",
    )?;
    let mut rows = stmt.query([username])?;
    let mut moods = Vec::new();
    while let Some(row) = rows.next()? {
        moods.push(parse_mood_row(row)?);
    }
    Ok(moods)
}

fn load_reminders(conn: &Connection, username: &str) -> RepoResult<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        "SELECT goal_id, time, active FROM reminders WHERE username = ?1 ORDER BY position;",
    )?;
    let mut rows = stmt.query([username])?;
    let mut reminders = Vec::new();
    while let Some(row) = rows.next()? {
        reminders.push(Reminder {
            goal_id: parse_uuid(row, "goal_id")?,
            time: row.get("time")?,
            active: row.get("active")?,
        });
    }
    Ok(reminders)
}

fn load_strings(conn: &Connection, sql: &str, username: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map([username], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

fn parse_mood_row(row: &Row<'_>) -> RepoResult<MoodEntry> {
    let date_text: String = row.get("mood_date")?;
    let date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!("invalid date `{date_text}` in moods.mood_date"))
    })?;
    Ok(MoodEntry {
        date,
        mood: parse_mood(row, "mood")?,
        completed_goals: row.get("completed_goals")?,
        completed_habits: row.get("completed_habits")?,
    })
}

fn parse_reflection_row(row: &Row<'_>) -> RepoResult<Reflection> {
    let mood = match row.get::<_, Option<String>>("mood")? {
        Some(_) => Some(parse_mood(row, "mood")?),
        None => None,
    };
    Ok(Reflection {
        id: parse_uuid(row, "reflection_id")?,
        created_at_ms: row.get("created_at")?,
        text: row.get("text")?,
        mood,
    })
}

fn parse_mood(row: &Row<'_>, column: &str) -> RepoResult<Mood> {
    let text: String = row.get(column)?;
    text.parse::<Mood>()
        .map_err(|_| RepoError::InvalidData(format!("invalid mood `{text}` in {column}")))
}

fn parse_uuid(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{text}` in {column}")))
}
