//! Per-user tracking document.
//!
//! # Responsibility
//! - Define the user document mirrored between the record store and the
//!   client-side cache.
//! - Provide the small in-memory mutations shared by both sides.
//!
//! # Invariants
//! - `stats` counters are cumulative; they are not derived from the length of
//!   `goals`/`habits`.
//! - `moods` holds at most one entry per calendar date.
//! - `unlocked_badges` never contains the same key twice.
//! - `reflections` are never written through [`UserPatch`].

use crate::model::badge::PARTICIPATION_BADGE_KEY;
use crate::model::mood::Mood;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Suggestion shown to new users and used whenever suggestion generation fails.
pub const DEFAULT_SUGGESTION: &str = "Set a new goal or habit to get started!";

const USERNAME_MAX_CHARS: usize = 64;

static REMINDER_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("valid reminder time regex"));

/// Working-list category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Goal,
    Habit,
}

impl ItemKind {
    /// Human-facing label (`Goal`/`Habit`).
    pub fn label(self) -> &'static str {
        match self {
            Self::Goal => "Goal",
            Self::Habit => "Habit",
        }
    }

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Habit => "habit",
        }
    }
}

/// One goal or habit in a working list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEntry {
    /// Referenced by reminders.
    pub id: Uuid,
    pub text: String,
    /// Only set for seeded items; completion normally removes the item.
    pub completed: bool,
    pub created_at_ms: i64,
}

impl ItemEntry {
    pub fn new(text: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            completed: false,
            created_at_ms,
        }
    }
}

/// Cumulative completion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub goals_completed: u32,
    pub habits_completed: u32,
    pub streak: u32,
}

impl Stats {
    pub fn completed(&self, kind: ItemKind) -> u32 {
        match kind {
            ItemKind::Goal => self.goals_completed,
            ItemKind::Habit => self.habits_completed,
        }
    }

    pub fn increment(&mut self, kind: ItemKind) {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_add(1);
    }

    /// Saturates at zero.
    pub fn decrement(&mut self, kind: ItemKind) {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_sub(1);
    }

    fn counter_mut(&mut self, kind: ItemKind) -> &mut u32 {
        match kind {
            ItemKind::Goal => &mut self.goals_completed,
            ItemKind::Habit => &mut self.habits_completed,
        }
    }
}

/// Mood for one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub date: NaiveDate,
    pub mood: Mood,
    /// In-place completed goals at the time the entry was first written.
    pub completed_goals: u32,
    /// In-place completed habits at the time the entry was first written.
    pub completed_habits: u32,
}

/// Journal/reflection entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub id: Uuid,
    pub created_at_ms: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
}

impl Reflection {
    pub fn new(text: impl Into<String>, mood: Option<Mood>, created_at_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at_ms,
            text: text.into(),
            mood,
        }
    }
}

/// Sorts reflections newest first; ties keep insertion order.
pub fn sort_reflections_desc(reflections: &mut [Reflection]) {
    reflections.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
}

/// Daily reminder for one goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub goal_id: Uuid,
    /// Local wall-clock time as `HH:MM`.
    pub time: String,
    pub active: bool,
}

/// Leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub stats: Stats,
}

/// The full per-user document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub goals: Vec<ItemEntry>,
    pub habits: Vec<ItemEntry>,
    pub stats: Stats,
    pub moods: Vec<MoodEntry>,
    pub reflections: Vec<Reflection>,
    pub unlocked_badges: Vec<String>,
    pub reminders: Vec<Reminder>,
    pub suggestions: Vec<String>,
}

impl UserRecord {
    /// Builds the document created at registration.
    ///
    /// # Invariants
    /// - Stats start at zero, working lists start empty.
    /// - One seed mood (`Okay`) is dated `today`.
    /// - Only the participation badge is unlocked.
    pub fn registered(username: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            username: username.into(),
            goals: Vec::new(),
            habits: Vec::new(),
            stats: Stats::default(),
            moods: vec![MoodEntry {
                date: today,
                mood: Mood::Okay,
                completed_goals: 0,
                completed_habits: 0,
            }],
            reflections: Vec::new(),
            unlocked_badges: vec![PARTICIPATION_BADGE_KEY.to_string()],
            reminders: Vec::new(),
            suggestions: vec![DEFAULT_SUGGESTION.to_string()],
        }
    }

    pub fn items(&self, kind: ItemKind) -> &[ItemEntry] {
        match kind {
            ItemKind::Goal => &self.goals,
            ItemKind::Habit => &self.habits,
        }
    }

    pub fn items_mut(&mut self, kind: ItemKind) -> &mut Vec<ItemEntry> {
        match kind {
            ItemKind::Goal => &mut self.goals,
            ItemKind::Habit => &mut self.habits,
        }
    }

    /// Removes the first item whose text matches exactly.
    pub fn take_item(&mut self, kind: ItemKind, text: &str) -> Option<ItemEntry> {
        let items = self.items_mut(kind);
        let index = items.iter().position(|item| item.text == text)?;
        Some(items.remove(index))
    }

    /// Items of `kind` flagged as completed in place.
    pub fn completed_in_place(&self, kind: ItemKind) -> u32 {
        let count = self.items(kind).iter().filter(|item| item.completed).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn has_badge(&self, key: &str) -> bool {
        self.unlocked_badges.iter().any(|unlocked| unlocked == key)
    }

    /// Appends `key` unless already present. Returns whether it was added.
    pub fn unlock_badge(&mut self, key: &str) -> bool {
        if self.has_badge(key) {
            return false;
        }
        self.unlocked_badges.push(key.to_string());
        true
    }

    pub fn mood_on(&self, date: NaiveDate) -> Option<&MoodEntry> {
        self.moods.iter().find(|entry| entry.date == date)
    }

    /// Mood of `today`, else the most recently appended one.
    pub fn current_mood(&self, today: NaiveDate) -> Option<Mood> {
        self.mood_on(today)
            .or_else(|| self.moods.last())
            .map(|entry| entry.mood)
    }

    /// Sets the mood for `date`, overwriting an existing entry for that day.
    ///
    /// Completion snapshots are taken only when the entry is first created.
    pub fn upsert_mood(&mut self, date: NaiveDate, mood: Mood) -> MoodEntry {
        if let Some(existing) = self.moods.iter_mut().find(|entry| entry.date == date) {
            existing.mood = mood;
            return *existing;
        }

        let entry = MoodEntry {
            date,
            mood,
            completed_goals: self.completed_in_place(ItemKind::Goal),
            completed_habits: self.completed_in_place(ItemKind::Habit),
        };
        self.moods.push(entry);
        entry
    }

    pub fn goal_by_id(&self, goal_id: Uuid) -> Option<&ItemEntry> {
        self.goals.iter().find(|goal| goal.id == goal_id)
    }

    /// Validates invariants enforced on every store write.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        validate_username(&self.username)?;
        for kind in [ItemKind::Goal, ItemKind::Habit] {
            for item in self.items(kind) {
                validate_item_text(kind, &item.text)?;
            }
        }
        validate_unique_mood_dates(&self.moods)?;
        validate_unique_badges(&self.unlocked_badges)?;
        for reminder in &self.reminders {
            validate_reminder_time(&reminder.time)?;
        }
        Ok(())
    }
}

/// Field-level update of the mutable, non-append-only parts of a user.
///
/// Has no reflections field: journal entries are only
/// appended through dedicated store operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<ItemEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habits: Option<Vec<ItemEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moods: Option<Vec<MoodEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Vec<Reminder>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_badges: Option<Vec<String>>,
}

impl UserPatch {
    /// Captures every patchable field of `user`.
    pub fn from_record(user: &UserRecord) -> Self {
        Self {
            goals: Some(user.goals.clone()),
            habits: Some(user.habits.clone()),
            stats: Some(user.stats),
            moods: Some(user.moods.clone()),
            reminders: Some(user.reminders.clone()),
            suggestions: Some(user.suggestions.clone()),
            unlocked_badges: Some(user.unlocked_badges.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merges supplied fields into `user`; absent fields are left untouched.
    pub fn apply_to(&self, user: &mut UserRecord) {
        if let Some(goals) = &self.goals {
            user.goals = goals.clone();
        }
        if let Some(habits) = &self.habits {
            user.habits = habits.clone();
        }
        if let Some(stats) = self.stats {
            user.stats = stats;
        }
        if let Some(moods) = &self.moods {
            user.moods = moods.clone();
        }
        if let Some(reminders) = &self.reminders {
            user.reminders = reminders.clone();
        }
        if let Some(suggestions) = &self.suggestions {
            user.suggestions = suggestions.clone();
        }
        if let Some(badges) = &self.unlocked_badges {
            user.unlocked_badges = badges.clone();
        }
    }

    /// Validates only the fields that are present.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        for (kind, items) in [(ItemKind::Goal, &self.goals), (ItemKind::Habit, &self.habits)] {
            for item in items.iter().flatten() {
                validate_item_text(kind, &item.text)?;
            }
        }
        if let Some(moods) = &self.moods {
            validate_unique_mood_dates(moods)?;
        }
        if let Some(badges) = &self.unlocked_badges {
            validate_unique_badges(badges)?;
        }
        for reminder in self.reminders.iter().flatten() {
            validate_reminder_time(&reminder.time)?;
        }
        Ok(())
    }
}

/// Validation failures for user documents and user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    EmptyUsername,
    UsernameHasSurroundingWhitespace,
    UsernameTooLong { chars: usize },
    EmptyPassword,
    BlankItemText(ItemKind),
    BlankJournalText,
    DuplicateMoodDate(NaiveDate),
    DuplicateBadge(String),
    InvalidReminderTime(String),
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUsername => write!(f, "username cannot be empty"),
            Self::UsernameHasSurroundingWhitespace => {
                write!(f, "username cannot start or end with whitespace")
            }
            Self::UsernameTooLong { chars } => write!(
                f,
                "username has {chars} characters; maximum is {USERNAME_MAX_CHARS}"
            ),
            Self::EmptyPassword => write!(f, "password cannot be empty"),
            Self::BlankItemText(kind) => write!(f, "{} text cannot be blank", kind.label()),
            Self::BlankJournalText => write!(f, "journal entry is required"),
            Self::DuplicateMoodDate(date) => write!(f, "more than one mood entry for {date}"),
            Self::DuplicateBadge(key) => write!(f, "badge `{key}` is listed more than once"),
            Self::InvalidReminderTime(value) => {
                write!(f, "invalid reminder time `{value}`; expected HH:MM")
            }
        }
    }
}

impl Error for UserValidationError {}

pub fn validate_username(username: &str) -> Result<(), UserValidationError> {
    if username.trim().is_empty() {
        return Err(UserValidationError::EmptyUsername);
    }
    if username.trim() != username {
        return Err(UserValidationError::UsernameHasSurroundingWhitespace);
    }
    let chars = username.chars().count();
    if chars > USERNAME_MAX_CHARS {
        return Err(UserValidationError::UsernameTooLong { chars });
    }
    Ok(())
}

pub fn validate_item_text(kind: ItemKind, text: &str) -> Result<(), UserValidationError> {
    if text.trim().is_empty() {
        return Err(UserValidationError::BlankItemText(kind));
    }
    Ok(())
}

pub fn validate_journal_text(text: &str) -> Result<(), UserValidationError> {
    if text.trim().is_empty() {
        return Err(UserValidationError::BlankJournalText);
    }
    Ok(())
}

/// Accepts 24-hour `HH:MM`.
pub fn validate_reminder_time(time: &str) -> Result<(), UserValidationError> {
    if REMINDER_TIME_RE.is_match(time) {
        Ok(())
    } else {
        Err(UserValidationError::InvalidReminderTime(time.to_string()))
    }
}

/// Parses a validated `HH:MM` string into `(hours, minutes)`.
pub fn parse_reminder_time(time: &str) -> Result<(u32, u32), UserValidationError> {
    let invalid = || UserValidationError::InvalidReminderTime(time.to_string());
    let captures = REMINDER_TIME_RE.captures(time).ok_or_else(invalid)?;
    let hours = captures[1].parse::<u32>().map_err(|_| invalid())?;
    let minutes = captures[2].parse::<u32>().map_err(|_| invalid())?;
    Ok((hours, minutes))
}

fn validate_unique_mood_dates(moods: &[MoodEntry]) -> Result<(), UserValidationError> {
    for (index, entry) in moods.iter().enumerate() {
        if moods[..index].iter().any(|prior| prior.date == entry.date) {
            return Err(UserValidationError::DuplicateMoodDate(entry.date));
        }
    }
    Ok(())
}

fn validate_unique_badges(badges: &[String]) -> Result<(), UserValidationError> {
    for (index, key) in badges.iter().enumerate() {
        if badges[..index].contains(key) {
            return Err(UserValidationError::DuplicateBadge(key.clone()));
        }
    }
    Ok(())
}
