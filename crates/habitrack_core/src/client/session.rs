//! Client session: the single-threaded event loop owning all client state.
//!
//! # Responsibility
//! - Apply user actions optimistically to the local cache.
//! - Run achievement evaluation after each mutation and queue persistence.
//! - Own the timers for undo expiry, badge-render retries and reminders.
//!
//! # Invariants
//! - Local mutation strictly precedes the persist enqueue.
//! - Nothing reaches the store until `run_until_idle`, except reads and the
//!   journal submission flow.
//! - Store failures never surface from background work; they are logged.

use crate::achievement::{AchievementEngine, AchievementNotification, BadgeView};
use crate::client::cache::LocalCache;
use crate::client::completion::{
    CompletionError, CompletionWorkflow, PendingUndo, RevertOutcome, UNDO_WINDOW,
};
use crate::client::reconcile::{DrainReport, Reconciler};
use crate::client::store::{RecordStore, StoreError};
use crate::client::timers::{TimerId, TimerQueue};
use crate::clock::{start_of_day_ms, Clock};
use crate::model::mood::Mood;
use crate::model::user::{
    parse_reminder_time, validate_item_text, validate_journal_text, ItemEntry, ItemKind,
    LeaderboardEntry, MoodEntry, Reflection, Reminder, UserRecord, UserValidationError,
    DEFAULT_SUGGESTION,
};
use crate::service::suggestion_service::{
    heuristic_suggestions, suggestions_from_journal, SuggestionProvider,
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

/// Delays before each badge-render retry.
pub const BADGE_RENDER_RETRY_DELAYS_MS: [i64; 3] = [200, 400, 600];

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No user document is loaded.
    NotSignedIn,
    Validation(String),
    Store(StoreError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "no user is signed in"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::NotSignedIn | Self::Validation(_) => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<UserValidationError> for SessionError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<CompletionError> for SessionError {
    fn from(value: CompletionError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// UI container that badge tiles are drawn into.
pub trait BadgeBoard {
    /// Whether the container currently exists on screen.
    fn is_attached(&self) -> bool;
    fn render(&mut self, badges: &[BadgeView]);
}

/// Reminder that came due for a goal still on the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotice {
    pub goal_id: Uuid,
    pub goal_text: String,
    pub time: String,
}

/// Observable outcome of background work, drained by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Achievement(AchievementNotification),
    /// The undo window of a completion closed.
    UndoCommitted { token: Uuid },
    Reminder(ReminderNotice),
    /// Badge rendering gave up after the last retry.
    BadgeRenderAbandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionTask {
    ExpireUndo(Uuid),
    RetryBadgeRender { attempt: usize },
    Reminder { goal_id: Uuid, time: String },
}

/// Tunables for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub undo_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            undo_window: UNDO_WINDOW,
        }
    }
}

pub struct Session<S: RecordStore, C: Clock> {
    store: S,
    clock: C,
    cache: LocalCache,
    reconciler: Reconciler,
    engine: AchievementEngine,
    completion: CompletionWorkflow,
    timers: TimerQueue<SessionTask>,
    render_retry: Option<TimerId>,
    /// One live timer per `(goal_id, time)` reminder.
    reminder_timers: BTreeMap<(Uuid, String), TimerId>,
    board: Option<Box<dyn BadgeBoard>>,
    suggester: Option<Box<dyn SuggestionProvider>>,
    events: Vec<SessionEvent>,
}

impl<S: RecordStore, C: Clock> Session<S, C> {
    pub fn new(store: S, clock: C, options: SessionOptions) -> Self {
        Self {
            store,
            clock,
            cache: LocalCache::new(),
            reconciler: Reconciler::new(),
            engine: AchievementEngine::new(),
            completion: CompletionWorkflow::new(options.undo_window),
            timers: TimerQueue::new(),
            render_retry: None,
            reminder_timers: BTreeMap::new(),
            board: None,
            suggester: None,
            events: Vec::new(),
        }
    }

    pub fn with_suggestion_provider(mut self, provider: Box<dyn SuggestionProvider>) -> Self {
        self.suggester = Some(provider);
        self
    }

    /// Attaches the badge container and renders into it right away.
    pub fn attach_board(&mut self, board: Box<dyn BadgeBoard>) {
        self.board = Some(board);
        if self.cache.user().is_some() {
            self.render_badges();
        }
    }

    pub fn detach_board(&mut self) -> Option<Box<dyn BadgeBoard>> {
        self.board.take()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn current_user(&self) -> Option<&UserRecord> {
        self.cache.user()
    }

    pub fn journal(&self) -> &[Reflection] {
        self.cache.journal()
    }

    pub fn pending_undo(&self) -> Option<&PendingUndo> {
        self.completion.pending()
    }

    pub fn pending_persists(&self) -> usize {
        self.reconciler.pending()
    }

    /// Number of reminders with a live timer.
    pub fn scheduled_reminders(&self) -> usize {
        self.reminder_timers.len()
    }

    pub fn next_timer_due(&self) -> Option<i64> {
        self.timers.next_due()
    }

    pub fn was_notified(&self, badge_key: &str) -> bool {
        self.engine.was_notified_this_session(badge_key)
    }

    /// Drains events produced since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Creates an account and loads it.
    pub fn register(&mut self, username: &str, password: &str) -> SessionResult<&UserRecord> {
        self.store.register(username, password)?;
        self.load(username)
    }

    /// Checks credentials and loads the user.
    pub fn login(&mut self, username: &str, password: &str) -> SessionResult<&UserRecord> {
        self.store.login(username, password)?;
        self.load(username)
    }

    /// Fetches the user document into the cache and starts its timers.
    ///
    /// A document missing its seed mood or suggestions is repaired and
    /// written back.
    pub fn load(&mut self, username: &str) -> SessionResult<&UserRecord> {
        let mut user = self.store.get_user(username)?;
        let repaired = normalize_loaded(&mut user, self.clock.today());

        let journal = match self.store.get_journal(username) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("event=journal_load module=session status=error error={err}");
                Vec::new()
            }
        };

        self.cancel_session_timers();
        self.completion.discard();
        self.cache.replace(user);
        self.cache.replace_journal(journal);

        let changed = self.evaluate_achievements();
        if repaired || changed {
            self.persist_current();
        }
        self.render_badges();
        self.schedule_reminders();
        info!(
            "event=session_load module=session status=ok repaired={repaired} badges_changed={changed}"
        );
        self.current_user().ok_or(SessionError::NotSignedIn)
    }

    /// Forgets the signed-in user and every pending timer.
    ///
    /// Queued writes are kept so `run_until_idle` still flushes them.
    pub fn sign_out(&mut self) {
        self.cancel_session_timers();
        self.completion.discard();
        self.cache.clear();
    }

    /// Appends a new active item. Returns its id.
    pub fn add_item(&mut self, kind: ItemKind, text: &str) -> SessionResult<Uuid> {
        validate_item_text(kind, text)?;
        let now_ms = self.clock.now_ms();
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        let entry = ItemEntry::new(text.trim(), now_ms);
        let id = entry.id;
        user.items_mut(kind).push(entry);
        self.persist_current();
        Ok(id)
    }

    /// Removes the first item with `text` without counting it as completed.
    pub fn delete_item(&mut self, kind: ItemKind, text: &str) -> SessionResult<bool> {
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        let removed = user.take_item(kind, text).is_some();
        if removed {
            self.persist_current();
        }
        Ok(removed)
    }

    pub fn clear_items(&mut self, kind: ItemKind) -> SessionResult<()> {
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        user.items_mut(kind).clear();
        self.persist_current();
        Ok(())
    }

    /// Completes the first item matching `text` and opens its undo window.
    pub fn complete(&mut self, kind: ItemKind, text: &str) -> SessionResult<PendingUndo> {
        let now_ms = self.clock.now_ms();
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        let undo = self.completion.complete(user, kind, text, now_ms)?;

        self.evaluate_achievements();
        self.persist_current();
        self.timers
            .schedule(undo.expires_at_ms, SessionTask::ExpireUndo(undo.token));
        self.render_badges();
        info!(
            "event=item_complete module=session status=ok kind={}",
            kind.label()
        );
        Ok(undo)
    }

    /// Undoes the completion behind `token` if its window is still open.
    ///
    /// Badges unlocked by that completion stay unlocked.
    pub fn revert(&mut self, token: Uuid) -> SessionResult<RevertOutcome> {
        let now_ms = self.clock.now_ms();
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        let outcome = self.completion.revert(user, token, now_ms);
        if outcome == RevertOutcome::Reverted {
            self.persist_current();
            if self.evaluate_achievements() {
                self.persist_current();
            }
            self.render_badges();
        }
        debug!("event=item_revert module=session status={outcome:?}");
        Ok(outcome)
    }

    /// Adds a daily reminder at `time` (`HH:MM`, UTC) for an existing goal.
    pub fn set_reminder(&mut self, goal_id: Uuid, time: &str) -> SessionResult<()> {
        let due_ms = next_reminder_ms(self.clock.now_ms(), time)?;
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        if user.goal_by_id(goal_id).is_none() {
            return Err(SessionError::Validation(format!("goal not found: {goal_id}")));
        }
        user.reminders.push(Reminder {
            goal_id,
            time: time.to_string(),
            active: true,
        });
        self.persist_current();
        self.schedule_reminder(due_ms, goal_id, time.to_string());
        Ok(())
    }

    /// Saves today's mood and a journal entry, then regenerates suggestions.
    ///
    /// Queued writes are flushed first so the re-read that follows sees them.
    /// Store failures are logged; the optimistic state is kept.
    pub fn submit_mood_and_journal(&mut self, mood: Mood, text: &str) -> SessionResult<Vec<String>> {
        validate_journal_text(text)?;
        let today = self.clock.today();
        let now_ms = self.clock.now_ms();
        let user = self.cache.user_mut().ok_or(SessionError::NotSignedIn)?;
        user.upsert_mood(today, mood);
        let username = user.username.clone();
        self.cache
            .push_journal(Reflection::new(text, Some(mood), now_ms));

        self.reconciler.drain(&self.store, &mut self.cache);
        if let Err(err) = self.store.post_mood(&username, mood) {
            warn!("event=mood_post module=session status=error error={err}");
        }
        if let Err(err) = self.store.post_journal(&username, text, Some(mood)) {
            warn!("event=journal_post module=session status=error error={err}");
        }
        match self.store.get_journal(&username) {
            Ok(entries) => self.cache.replace_journal(entries),
            Err(err) => warn!("event=journal_refresh module=session status=error error={err}"),
        }
        if let Some(fresh) = crate::client::reconcile::refresh(&self.store, &username) {
            self.cache.replace(fresh);
        }

        let suggestions = suggestions_from_journal(self.suggester.as_deref(), text, Some(mood));
        if let Some(user) = self.cache.user_mut() {
            user.suggestions = suggestions.clone();
        }
        self.persist_current();
        Ok(suggestions)
    }

    /// Suggestions derived locally from completed goals and mood.
    pub fn local_suggestions(&self) -> SessionResult<Vec<String>> {
        let user = self.current_user().ok_or(SessionError::NotSignedIn)?;
        Ok(heuristic_suggestions(user, self.clock.today()))
    }

    pub fn mood_today(&self) -> SessionResult<Option<MoodEntry>> {
        let user = self.current_user().ok_or(SessionError::NotSignedIn)?;
        Ok(user.mood_on(self.clock.today()).copied())
    }

    pub fn save_reflection(
        &mut self,
        date: Option<NaiveDate>,
        text: &str,
    ) -> SessionResult<Reflection> {
        let username = self.signed_in_username()?;
        let saved = self.store.save_reflection(&username, date, text)?;
        match self.store.get_journal(&username) {
            Ok(entries) => self.cache.replace_journal(entries),
            Err(err) => warn!("event=journal_refresh module=session status=error error={err}"),
        }
        Ok(saved)
    }

    pub fn reflection_for(&self, date: NaiveDate) -> SessionResult<String> {
        let username = self.signed_in_username()?;
        Ok(self.store.reflection_for(&username, date)?)
    }

    pub fn leaderboard(&self) -> SessionResult<Vec<LeaderboardEntry>> {
        Ok(self.store.leaderboard()?)
    }

    /// Badge tiles for the signed-in user.
    pub fn badges(&self) -> SessionResult<Vec<BadgeView>> {
        let user = self.current_user().ok_or(SessionError::NotSignedIn)?;
        Ok(self.engine.views(user))
    }

    /// Draws badges into the board, or schedules a retry when none is attached.
    pub fn render_badges(&mut self) {
        let Some(user) = self.cache.user() else {
            return;
        };
        let views = self.engine.views(user);
        match self.board.as_mut() {
            Some(board) if board.is_attached() => {
                board.render(&views);
                if let Some(retry) = self.render_retry.take() {
                    self.timers.cancel(retry);
                }
            }
            _ => {
                if self.render_retry.is_none() {
                    self.schedule_render_retry(0);
                }
            }
        }
    }

    /// Fires every timer that is due. Returns how many fired.
    pub fn tick(&mut self) -> usize {
        let now_ms = self.clock.now_ms();
        let due = self.timers.pop_due(now_ms);
        let fired = due.len();
        for task in due {
            self.handle_task(task, now_ms);
        }
        fired
    }

    /// Fires due timers, then flushes every queued write.
    pub fn run_until_idle(&mut self) -> DrainReport {
        self.tick();
        self.reconciler.drain(&self.store, &mut self.cache)
    }

    fn handle_task(&mut self, task: SessionTask, now_ms: i64) {
        match task {
            SessionTask::ExpireUndo(token) => {
                if self.completion.expire(token, now_ms) {
                    self.events.push(SessionEvent::UndoCommitted { token });
                }
            }
            SessionTask::RetryBadgeRender { attempt } => {
                self.render_retry = None;
                let attached = self.board.as_ref().is_some_and(|board| board.is_attached());
                if attached {
                    self.render_badges();
                } else if attempt + 1 < BADGE_RENDER_RETRY_DELAYS_MS.len() {
                    self.schedule_render_retry(attempt + 1);
                } else {
                    warn!(
                        "event=badge_render module=session status=abandoned error_code=render_target_missing attempts={}",
                        BADGE_RENDER_RETRY_DELAYS_MS.len()
                    );
                    self.events.push(SessionEvent::BadgeRenderAbandoned);
                }
            }
            SessionTask::Reminder { goal_id, time } => self.fire_reminder(goal_id, time, now_ms),
        }
    }

    fn fire_reminder(&mut self, goal_id: Uuid, time: String, now_ms: i64) {
        self.reminder_timers.remove(&(goal_id, time.clone()));
        let Some(user) = self.cache.user() else {
            return;
        };
        let still_active = user
            .reminders
            .iter()
            .any(|r| r.active && r.goal_id == goal_id && r.time == time);
        if !still_active {
            return;
        }
        if let Some(goal) = user.goal_by_id(goal_id).filter(|goal| !goal.completed) {
            self.events.push(SessionEvent::Reminder(ReminderNotice {
                goal_id,
                goal_text: goal.text.clone(),
                time: time.clone(),
            }));
        }
        if let Ok(due_ms) = next_reminder_ms(now_ms, &time) {
            self.schedule_reminder(due_ms, goal_id, time);
        }
    }

    fn schedule_render_retry(&mut self, attempt: usize) {
        let due_ms = self.clock.now_ms() + BADGE_RENDER_RETRY_DELAYS_MS[attempt];
        debug!("event=badge_render module=session status=retry attempt={}", attempt + 1);
        self.render_retry = Some(
            self.timers
                .schedule(due_ms, SessionTask::RetryBadgeRender { attempt }),
        );
    }

    fn schedule_reminders(&mut self) {
        let now_ms = self.clock.now_ms();
        let Some(user) = self.cache.user() else {
            return;
        };
        let active: Vec<Reminder> = user.reminders.iter().filter(|r| r.active).cloned().collect();
        for reminder in active {
            match next_reminder_ms(now_ms, &reminder.time) {
                Ok(due_ms) => self.schedule_reminder(due_ms, reminder.goal_id, reminder.time),
                Err(err) => warn!("event=reminder_schedule module=session status=error error={err}"),
            }
        }
    }

    /// Replaces any live timer of the same reminder.
    fn schedule_reminder(&mut self, due_ms: i64, goal_id: Uuid, time: String) {
        let task = SessionTask::Reminder {
            goal_id,
            time: time.clone(),
        };
        let id = self.timers.schedule(due_ms, task);
        if let Some(previous) = self.reminder_timers.insert((goal_id, time), id) {
            self.timers.cancel(previous);
        }
    }

    fn cancel_session_timers(&mut self) {
        for (_, id) in std::mem::take(&mut self.reminder_timers) {
            self.timers.cancel(id);
        }
        if let Some(retry) = self.render_retry.take() {
            self.timers.cancel(retry);
        }
    }

    /// Returns whether `unlocked_badges` grew.
    fn evaluate_achievements(&mut self) -> bool {
        let Some(user) = self.cache.user_mut() else {
            return false;
        };
        let result = self.engine.evaluate(user);
        self.events.extend(
            self.engine
                .take_notifications()
                .into_iter()
                .map(SessionEvent::Achievement),
        );
        result.changed
    }

    fn persist_current(&mut self) {
        if let Some(user) = self.cache.user() {
            self.reconciler.persist(user);
        }
    }

    fn signed_in_username(&self) -> SessionResult<String> {
        self.cache
            .username()
            .map(str::to_string)
            .ok_or(SessionError::NotSignedIn)
    }
}

/// Epoch milliseconds of the next `HH:MM` (UTC) strictly after `now_ms`.
pub fn next_reminder_ms(now_ms: i64, time: &str) -> Result<i64, UserValidationError> {
    let (hours, minutes) = parse_reminder_time(time)?;
    let today = crate::clock::date_of_ms(now_ms);
    let offset_ms = (i64::from(hours) * 60 + i64::from(minutes)) * 60 * 1000;
    let candidate = start_of_day_ms(today) + offset_ms;
    if candidate > now_ms {
        Ok(candidate)
    } else {
        Ok(candidate + DAY_MS)
    }
}

/// Fills defaults a stored document may lack. Returns whether it changed.
fn normalize_loaded(user: &mut UserRecord, today: NaiveDate) -> bool {
    let mut repaired = false;
    if user.moods.is_empty() {
        user.upsert_mood(today, Mood::Okay);
        repaired = true;
    }
    if user.suggestions.is_empty() {
        user.suggestions = vec![DEFAULT_SUGGESTION.to_string()];
        repaired = true;
    }
    repaired
}
