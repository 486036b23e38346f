//! Mood and journal use-cases on the store side.
//!
//! # Responsibility
//! - Upsert the mood of the current calendar date.
//! - Append journal entries and list them newest first.
//! - Upsert the dated reflection used by the reflection-history view.
//!
//! # Invariants
//! - At most one mood per user per calendar date; a second save overwrites
//!   the mood and keeps the first completion snapshot.
//! - Journal appends never overwrite earlier entries.

use crate::clock::{date_of_ms, start_of_day_ms, Clock};
use crate::model::mood::Mood;
use crate::model::user::{validate_journal_text, MoodEntry, Reflection, UserRecord};
use crate::repo::user_repo::{RepoError, RepoResult, UserRepository};
use chrono::NaiveDate;
use log::info;

pub struct JournalService<R: UserRepository, C: Clock> {
    repo: R,
    clock: C,
}

impl<R: UserRepository, C: Clock> JournalService<R, C> {
    pub fn new(repo: R, clock: C) -> Self {
        Self { repo, clock }
    }

    /// Saves `mood` for today.
    pub fn record_mood(&self, username: &str, mood: Mood) -> RepoResult<MoodEntry> {
        let mut user = self.require_user(username)?;
        let entry = user.upsert_mood(self.clock.today(), mood);
        let stored = self.repo.upsert_mood(username, &entry)?;
        info!(
            "event=mood_record module=journal status=ok date={} mood={}",
            stored.date, stored.mood
        );
        Ok(stored)
    }

    /// Appends one journal entry stamped with the current time.
    ///
    /// # Errors
    /// - `Validation(BlankJournalText)` before any lookup when `text` is blank.
    /// - `NotFound` when the user does not exist.
    pub fn append_entry(
        &self,
        username: &str,
        text: &str,
        mood: Option<Mood>,
    ) -> RepoResult<Reflection> {
        validate_journal_text(text)?;
        let reflection = Reflection::new(text, mood, self.clock.now_ms());
        self.repo.append_reflection(username, &reflection)?;
        info!(
            "event=journal_append module=journal status=ok chars={}",
            text.chars().count()
        );
        Ok(reflection)
    }

    /// All entries, newest first.
    pub fn list_entries(&self, username: &str) -> RepoResult<Vec<Reflection>> {
        self.require_user(username)?;
        self.repo.list_reflections(username)
    }

    /// Upserts the reflection dated `date` (today when `None`).
    ///
    /// An existing entry on that date gets its text replaced; otherwise a new
    /// entry is stored at the start of that day.
    pub fn save_reflection(
        &self,
        username: &str,
        date: Option<NaiveDate>,
        text: &str,
    ) -> RepoResult<Reflection> {
        validate_journal_text(text)?;
        let target = date.unwrap_or_else(|| self.clock.today());
        let existing = self
            .list_entries(username)?
            .into_iter()
            .find(|entry| date_of_ms(entry.created_at_ms) == target);

        match existing {
            Some(mut entry) => {
                self.repo.update_reflection_text(username, entry.id, text)?;
                entry.text = text.to_string();
                Ok(entry)
            }
            None => {
                let entry = Reflection::new(text, None, start_of_day_ms(target));
                self.repo.append_reflection(username, &entry)?;
                Ok(entry)
            }
        }
    }

    /// Text of the reflection dated `date`, or an empty string.
    pub fn reflection_for(&self, username: &str, date: NaiveDate) -> RepoResult<String> {
        Ok(self
            .list_entries(username)?
            .into_iter()
            .find(|entry| date_of_ms(entry.created_at_ms) == date)
            .map(|entry| entry.text)
            .unwrap_or_default())
    }

    fn require_user(&self, username: &str) -> RepoResult<UserRecord> {
        self.repo
            .get_user(username)?
            .ok_or_else(|| RepoError::NotFound(username.to_string()))
    }
}
