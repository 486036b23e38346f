//! Record store contract consumed by the client session.
//!
//! # Responsibility
//! - Describe the remote document store at field-level granularity.
//! - Map repository failures onto the client error taxonomy.
//!
//! # Invariants
//! - `put_user` can never write reflections (`UserPatch` has no such field).
//! - Journal listings are newest first.

use crate::clock::Clock;
use crate::model::mood::Mood;
use crate::model::user::{LeaderboardEntry, MoodEntry, Reflection, UserPatch, UserRecord};
use crate::repo::user_repo::{RepoError, SqliteUserRepository, UserRepository};
use crate::service::account_service::{AccountError, AccountService};
use crate::service::journal_service::JournalService;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default number of leaderboard rows.
pub const LEADERBOARD_LIMIT: u32 = 10;

pub type StoreResult<T> = Result<T, StoreError>;

/// Client-facing store failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// User absent (404-equivalent).
    NotFound(String),
    /// Input rejected before any mutation.
    Validation(String),
    /// Credentials did not match.
    Unauthorized,
    /// Transient store/transport failure.
    Persistence(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(username) => write!(f, "user not found: {username}"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::Unauthorized => write!(f, "invalid credentials"),
            Self::Persistence(message) => write!(f, "persistence failure: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(username) => Self::NotFound(username),
            RepoError::Validation(err) => Self::Validation(err.to_string()),
            RepoError::AlreadyExists(username) => {
                Self::Validation(format!("username already exists: {username}"))
            }
            other @ (RepoError::Db(_) | RepoError::InvalidData(_)) => {
                Self::Persistence(other.to_string())
            }
        }
    }
}

impl From<AccountError> for StoreError {
    fn from(value: AccountError) -> Self {
        match value {
            AccountError::InvalidCredentials => Self::Unauthorized,
            AccountError::Repo(err) => err.into(),
        }
    }
}

/// Remote document store as seen by one client.
pub trait RecordStore {
    fn register(&self, username: &str, password: &str) -> StoreResult<UserRecord>;
    fn login(&self, username: &str, password: &str) -> StoreResult<()>;
    fn get_user(&self, username: &str) -> StoreResult<UserRecord>;
    /// Merges the supplied fields and returns the stored document.
    fn put_user(&self, username: &str, patch: &UserPatch) -> StoreResult<UserRecord>;
    /// Upserts today's mood.
    fn post_mood(&self, username: &str, mood: Mood) -> StoreResult<MoodEntry>;
    /// Appends one journal entry stamped with the store's current time.
    fn post_journal(&self, username: &str, text: &str, mood: Option<Mood>)
        -> StoreResult<Reflection>;
    fn get_journal(&self, username: &str) -> StoreResult<Vec<Reflection>>;
    /// Upserts the reflection of `date` (today when `None`).
    fn save_reflection(
        &self,
        username: &str,
        date: Option<NaiveDate>,
        text: &str,
    ) -> StoreResult<Reflection>;
    /// Reflection text of `date`; empty when none was saved.
    fn reflection_for(&self, username: &str, date: NaiveDate) -> StoreResult<String>;
    fn leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>>;
}

/// Record store backed by a local SQLite database.
pub struct LocalRecordStore<C: Clock + Clone> {
    conn: Connection,
    clock: C,
    leaderboard_limit: u32,
}

impl<C: Clock + Clone> LocalRecordStore<C> {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection, clock: C) -> Self {
        Self {
            conn,
            clock,
            leaderboard_limit: LEADERBOARD_LIMIT,
        }
    }

    pub fn with_leaderboard_limit(mut self, limit: u32) -> Self {
        self.leaderboard_limit = limit;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn repo(&self) -> SqliteUserRepository<'_> {
        SqliteUserRepository::new(&self.conn)
    }

    fn journal(&self) -> JournalService<SqliteUserRepository<'_>, C> {
        JournalService::new(self.repo(), self.clock.clone())
    }
}

impl<C: Clock + Clone> RecordStore for LocalRecordStore<C> {
    fn register(&self, username: &str, password: &str) -> StoreResult<UserRecord> {
        Ok(AccountService::new(self.repo(), self.clock.clone()).register(username, password)?)
    }

    fn login(&self, username: &str, password: &str) -> StoreResult<()> {
        Ok(AccountService::new(self.repo(), self.clock.clone()).login(username, password)?)
    }

    fn get_user(&self, username: &str) -> StoreResult<UserRecord> {
        self.repo()
            .get_user(username)?
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }

    fn put_user(&self, username: &str, patch: &UserPatch) -> StoreResult<UserRecord> {
        self.repo().update_user(username, patch)?;
        self.get_user(username)
    }

    fn post_mood(&self, username: &str, mood: Mood) -> StoreResult<MoodEntry> {
        Ok(self.journal().record_mood(username, mood)?)
    }

    fn post_journal(
        &self,
        username: &str,
        text: &str,
        mood: Option<Mood>,
    ) -> StoreResult<Reflection> {
        Ok(self.journal().append_entry(username, text, mood)?)
    }

    fn get_journal(&self, username: &str) -> StoreResult<Vec<Reflection>> {
        Ok(self.journal().list_entries(username)?)
    }

    fn save_reflection(
        &self,
        username: &str,
        date: Option<NaiveDate>,
        text: &str,
    ) -> StoreResult<Reflection> {
        Ok(self.journal().save_reflection(username, date, text)?)
    }

    fn reflection_for(&self, username: &str, date: NaiveDate) -> StoreResult<String> {
        Ok(self.journal().reflection_for(username, date)?)
    }

    fn leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        Ok(self.repo().leaderboard(self.leaderboard_limit)?)
    }
}
