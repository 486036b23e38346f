use habitrack_core::achievement::BadgeView;
use habitrack_core::client::{
    BadgeBoard, LocalRecordStore, RecordStore, RevertOutcome, Session, SessionError,
    SessionEvent, SessionOptions,
};
use habitrack_core::clock::{start_of_day_ms, Clock, ManualClock};
use habitrack_core::db::open_db_in_memory;
use habitrack_core::model::user::{UserPatch, DEFAULT_SUGGESTION};
use habitrack_core::service::suggestion_service::{SuggestionError, SuggestionProvider};
use habitrack_core::{ItemKind, Mood};
use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

type TestSession = Session<LocalRecordStore<ManualClock>, ManualClock>;

fn noon() -> ManualClock {
    let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    ManualClock::new(start_of_day_ms(day) + 12 * 3_600_000)
}

fn session_with(clock: &ManualClock) -> TestSession {
    let store = LocalRecordStore::new(open_db_in_memory().unwrap(), clock.clone());
    Session::new(store, clock.clone(), SessionOptions::default())
}

fn achievement_keys(events: Vec<SessionEvent>) -> Vec<&'static str> {
    events
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Achievement(notification) => Some(notification.badge.key),
            _ => None,
        })
        .collect()
}

#[derive(Clone, Default)]
struct FakeBoard {
    attached: Rc<Cell<bool>>,
    renders: Rc<RefCell<Vec<Vec<BadgeView>>>>,
}

impl BadgeBoard for FakeBoard {
    fn is_attached(&self) -> bool {
        self.attached.get()
    }

    fn render(&mut self, badges: &[BadgeView]) {
        self.renders.borrow_mut().push(badges.to_vec());
    }
}

struct FixedProvider(Vec<&'static str>);

impl SuggestionProvider for FixedProvider {
    fn suggest(&self, _entry: &str, _mood: Option<Mood>) -> Result<Vec<String>, SuggestionError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

#[test]
fn register_loads_default_document_without_notifications() {
    let clock = noon();
    let mut session = session_with(&clock);

    let user = session.register("alice", "secret").unwrap();
    assert_eq!(user.unlocked_badges, vec!["custom".to_string()]);
    assert_eq!(user.suggestions, vec![DEFAULT_SUGGESTION.to_string()]);
    assert_eq!(user.moods.len(), 1);
    assert_eq!(user.moods[0].mood, Mood::Okay);
    assert!(achievement_keys(session.take_events()).is_empty());
}

#[test]
fn login_with_wrong_password_is_rejected() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "secret").unwrap();
    session.sign_out();

    let err = session.login("alice", "nope").unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));
    assert!(session.current_user().is_none());
    session.login("alice", "secret").unwrap();
}

#[test]
fn alice_completes_five_goals_and_sees_each_badge_once() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    for n in 1..=5 {
        session.add_item(ItemKind::Goal, &format!("goal {n}")).unwrap();
    }

    for n in 1..=5 {
        session.complete(ItemKind::Goal, &format!("goal {n}")).unwrap();
        clock.advance(Duration::from_secs(1));
    }

    assert_eq!(
        achievement_keys(session.take_events()),
        vec!["firstGoal", "goal5"]
    );
    let user = session.current_user().unwrap();
    assert_eq!(user.stats.goals_completed, 5);
    assert!(user.goals.is_empty());
    assert!(user.has_badge("firstGoal"));
    assert!(user.has_badge("goal5"));

    let report = session.run_until_idle();
    assert_eq!(report.failed, 0);
    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.stats.goals_completed, 5);
    assert_eq!(
        stored.unlocked_badges,
        vec!["custom".to_string(), "firstGoal".to_string(), "goal5".to_string()]
    );

    session.load("alice").unwrap();
    assert!(achievement_keys(session.take_events()).is_empty());
}

#[test]
fn local_state_changes_before_the_store_does() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.run_until_idle();
    session.add_item(ItemKind::Habit, "stretch").unwrap();
    session.complete(ItemKind::Habit, "stretch").unwrap();

    assert_eq!(session.current_user().unwrap().stats.habits_completed, 1);
    assert!(session.pending_persists() > 0);
    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.stats.habits_completed, 0);

    session.run_until_idle();
    assert_eq!(session.pending_persists(), 0);
    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.stats.habits_completed, 1);
    assert!(stored.habits.is_empty());
    assert_eq!(session.current_user(), Some(&stored));
}

#[test]
fn revert_inside_window_restores_item_but_keeps_badge() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.add_item(ItemKind::Goal, "run").unwrap();
    session.add_item(ItemKind::Goal, "read").unwrap();
    let goals_before = session.current_user().unwrap().goals.clone();

    let undo = session.complete(ItemKind::Goal, "run").unwrap();
    assert_eq!(achievement_keys(session.take_events()), vec!["firstGoal"]);

    clock.advance(Duration::from_millis(4_999));
    assert_eq!(session.revert(undo.token).unwrap(), RevertOutcome::Reverted);

    let user = session.current_user().unwrap();
    assert_eq!(user.stats.goals_completed, 0);
    assert_eq!(user.goals, goals_before);
    assert!(user.has_badge("firstGoal"));

    session.run_until_idle();
    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.stats.goals_completed, 0);
    assert!(stored.has_badge("firstGoal"));

    session.complete(ItemKind::Goal, "run").unwrap();
    assert!(achievement_keys(session.take_events()).is_empty());
}

#[test]
fn revert_after_window_has_no_effect() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.add_item(ItemKind::Goal, "run").unwrap();
    let undo = session.complete(ItemKind::Goal, "run").unwrap();

    clock.advance(Duration::from_secs(5));
    assert_eq!(session.revert(undo.token).unwrap(), RevertOutcome::Expired);

    let user = session.current_user().unwrap();
    assert_eq!(user.stats.goals_completed, 1);
    assert!(user.goals.is_empty());
}

#[test]
fn undo_timer_commits_and_superseded_timer_is_inert() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.add_item(ItemKind::Goal, "a").unwrap();
    session.add_item(ItemKind::Goal, "b").unwrap();
    session.take_events();

    let first = session.complete(ItemKind::Goal, "a").unwrap();
    clock.advance(Duration::from_secs(1));
    let second = session.complete(ItemKind::Goal, "b").unwrap();
    assert_eq!(session.revert(first.token).unwrap(), RevertOutcome::Superseded);

    clock.advance(Duration::from_secs(4));
    session.tick();
    assert!(session.pending_undo().is_some());

    clock.advance(Duration::from_secs(1));
    session.tick();
    let committed: Vec<_> = session
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, SessionEvent::UndoCommitted { .. }))
        .collect();
    assert_eq!(
        committed,
        vec![SessionEvent::UndoCommitted { token: second.token }]
    );
    assert!(session.pending_undo().is_none());
    assert_eq!(
        session.revert(second.token).unwrap(),
        RevertOutcome::NothingPending
    );
}

#[test]
fn completing_unknown_item_is_a_validation_error() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.run_until_idle();

    let err = session.complete(ItemKind::Goal, "missing").unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(session.current_user().unwrap().stats.goals_completed, 0);
    assert_eq!(session.pending_persists(), 0);
}

#[test]
fn actions_require_a_signed_in_user() {
    let clock = noon();
    let mut session = session_with(&clock);
    assert_eq!(
        session.add_item(ItemKind::Goal, "run").unwrap_err(),
        SessionError::NotSignedIn
    );
    assert_eq!(session.badges().unwrap_err(), SessionError::NotSignedIn);
}

#[test]
fn participation_badge_notifies_when_it_is_the_sole_badge() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.take_events();
    session
        .store()
        .put_user(
            "alice",
            &UserPatch {
                unlocked_badges: Some(Vec::new()),
                ..UserPatch::default()
            },
        )
        .unwrap();

    session.load("alice").unwrap();
    assert_eq!(achievement_keys(session.take_events()), vec!["custom"]);
    assert!(session.current_user().unwrap().has_badge("custom"));

    session.load("alice").unwrap();
    assert!(achievement_keys(session.take_events()).is_empty());
}

#[test]
fn participation_badge_is_silent_next_to_other_badges() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("bob", "pw").unwrap();
    let mut stats = session.current_user().unwrap().stats;
    stats.goals_completed = 1;
    session
        .store()
        .put_user(
            "bob",
            &UserPatch {
                stats: Some(stats),
                unlocked_badges: Some(vec!["firstGoal".to_string()]),
                ..UserPatch::default()
            },
        )
        .unwrap();

    session.load("bob").unwrap();
    assert!(achievement_keys(session.take_events()).is_empty());
    assert_eq!(
        session.current_user().unwrap().unlocked_badges,
        vec!["firstGoal".to_string(), "custom".to_string()]
    );
}

#[test]
fn missing_board_is_retried_then_abandoned() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let start = clock.now_ms();
    assert_eq!(session.next_timer_due(), Some(start + 200));

    clock.advance(Duration::from_millis(200));
    assert_eq!(session.tick(), 1);
    assert_eq!(session.next_timer_due(), Some(clock.now_ms() + 400));

    clock.advance(Duration::from_millis(400));
    session.tick();
    assert_eq!(session.next_timer_due(), Some(clock.now_ms() + 600));

    clock.advance(Duration::from_millis(600));
    session.tick();
    assert_eq!(session.next_timer_due(), None);
    assert!(session
        .take_events()
        .contains(&SessionEvent::BadgeRenderAbandoned));

    // evaluation kept working without a board
    session.add_item(ItemKind::Goal, "run").unwrap();
    session.complete(ItemKind::Goal, "run").unwrap();
    assert_eq!(achievement_keys(session.take_events()), vec!["firstGoal"]);
}

#[test]
fn board_that_appears_during_retries_gets_rendered() {
    let clock = noon();
    let mut session = session_with(&clock);
    let board = FakeBoard::default();
    session.attach_board(Box::new(board.clone()));
    session.register("alice", "pw").unwrap();
    assert!(board.renders.borrow().is_empty());

    clock.advance(Duration::from_millis(200));
    session.tick();
    board.attached.set(true);
    clock.advance(Duration::from_millis(400));
    session.tick();

    let renders = board.renders.borrow();
    assert_eq!(renders.len(), 1);
    let custom = renders[0].iter().find(|view| view.key == "custom").unwrap();
    assert!(custom.unlocked);
    let first_goal = renders[0].iter().find(|view| view.key == "firstGoal").unwrap();
    assert!(!first_goal.unlocked);
    drop(renders);
    assert!(!session
        .take_events()
        .contains(&SessionEvent::BadgeRenderAbandoned));
}

#[test]
fn attached_board_renders_after_each_completion() {
    let clock = noon();
    let mut session = session_with(&clock);
    let board = FakeBoard::default();
    board.attached.set(true);
    session.attach_board(Box::new(board.clone()));
    session.register("alice", "pw").unwrap();
    session.add_item(ItemKind::Habit, "floss").unwrap();
    session.complete(ItemKind::Habit, "floss").unwrap();

    let renders = board.renders.borrow();
    let last = renders.last().unwrap();
    assert!(last.iter().any(|view| view.key == "firstHabit" && view.unlocked));
    assert_eq!(session.next_timer_due(), Some(clock.now_ms() + 5_000));
}

#[test]
fn mood_and_journal_submission_reconciles_and_regenerates_suggestions() {
    let clock = noon();
    let store = LocalRecordStore::new(open_db_in_memory().unwrap(), clock.clone());
    let provider = FixedProvider(vec!["walk more", "read daily", "call a friend", "sleep early", "drink water"]);
    let mut session = Session::new(store, clock.clone(), SessionOptions::default())
        .with_suggestion_provider(Box::new(provider));
    session.register("alice", "pw").unwrap();

    let suggestions = session
        .submit_mood_and_journal(Mood::Great, "Shipped the release")
        .unwrap();
    assert_eq!(suggestions[0], "Walk more.");
    assert_eq!(suggestions.len(), 5);

    clock.advance(Duration::from_secs(60));
    session
        .submit_mood_and_journal(Mood::Bad, "Long evening")
        .unwrap();
    session.run_until_idle();

    let texts: Vec<_> = session.journal().iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["Long evening", "Shipped the release"]);

    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.moods.len(), 1);
    assert_eq!(stored.moods[0].mood, Mood::Bad);
    assert_eq!(stored.suggestions, suggestions_after(&session));
    assert_eq!(session.mood_today().unwrap().unwrap().mood, Mood::Bad);
}

fn suggestions_after(session: &TestSession) -> Vec<String> {
    session.current_user().unwrap().suggestions.clone()
}

#[test]
fn blank_journal_entry_is_rejected_without_mutation() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let err = session.submit_mood_and_journal(Mood::Good, "   ").unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(session.journal().is_empty());
    assert_eq!(session.current_user().unwrap().moods[0].mood, Mood::Okay);
}

#[test]
fn reminder_fires_while_goal_is_open() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let goal_id = session.add_item(ItemKind::Goal, "run").unwrap();
    session.set_reminder(goal_id, "12:30").unwrap();
    session.take_events();

    clock.advance(Duration::from_secs(30 * 60));
    session.tick();
    let reminders: Vec<_> = session
        .take_events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Reminder(notice) => Some(notice),
            _ => None,
        })
        .collect();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].goal_text, "run");
    assert_eq!(reminders[0].time, "12:30");

    session.complete(ItemKind::Goal, "run").unwrap();
    clock.advance(Duration::from_secs(24 * 3_600));
    session.tick();
    assert!(!session
        .take_events()
        .iter()
        .any(|event| matches!(event, SessionEvent::Reminder(_))));
}

#[test]
fn reminder_still_fires_after_completion_is_reverted() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let goal_id = session.add_item(ItemKind::Goal, "run").unwrap();
    session.set_reminder(goal_id, "12:30").unwrap();

    let undo = session.complete(ItemKind::Goal, "run").unwrap();
    assert_eq!(session.revert(undo.token).unwrap(), RevertOutcome::Reverted);
    assert_eq!(session.current_user().unwrap().goals[0].id, goal_id);
    session.take_events();

    clock.advance(Duration::from_secs(30 * 60));
    session.tick();
    let fired: Vec<_> = session
        .take_events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Reminder(notice) => Some(notice.goal_id),
            _ => None,
        })
        .collect();
    assert_eq!(fired, vec![goal_id]);
}

#[test]
fn repeated_reminder_firings_keep_one_timer_per_reminder() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let goal_id = session.add_item(ItemKind::Goal, "run").unwrap();
    session.set_reminder(goal_id, "12:30").unwrap();
    let scheduled = session.scheduled_reminders();

    for _ in 0..3 {
        clock.advance(Duration::from_secs(24 * 3_600));
        session.tick();
    }
    assert_eq!(session.scheduled_reminders(), scheduled);
    assert_eq!(scheduled, 1);
}

#[test]
fn reminder_requires_known_goal_and_valid_time() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let goal_id = session.add_item(ItemKind::Goal, "run").unwrap();

    assert!(matches!(
        session.set_reminder(goal_id, "25:00"),
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(
        session.set_reminder(uuid::Uuid::new_v4(), "08:00"),
        Err(SessionError::Validation(_))
    ));
    session.set_reminder(goal_id, "08:00").unwrap();
    session.run_until_idle();
    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.reminders.len(), 1);
    assert!(stored.reminders[0].active);
}

#[test]
fn delete_and_clear_do_not_touch_counters() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    session.add_item(ItemKind::Goal, "a").unwrap();
    session.add_item(ItemKind::Goal, "b").unwrap();
    session.add_item(ItemKind::Habit, "c").unwrap();

    assert!(session.delete_item(ItemKind::Goal, "a").unwrap());
    assert!(!session.delete_item(ItemKind::Goal, "a").unwrap());
    session.clear_items(ItemKind::Habit).unwrap();
    session.run_until_idle();

    let stored = session.store().get_user("alice").unwrap();
    assert_eq!(stored.goals.len(), 1);
    assert_eq!(stored.goals[0].text, "b");
    assert!(stored.habits.is_empty());
    assert_eq!(stored.stats.goals_completed, 0);
    assert_eq!(stored.stats.habits_completed, 0);
}

#[test]
fn dated_reflection_is_saved_and_read_back() {
    let clock = noon();
    let mut session = session_with(&clock);
    session.register("alice", "pw").unwrap();
    let yesterday = clock.today().pred_opt().unwrap();

    session.save_reflection(Some(yesterday), "quiet day").unwrap();
    session.save_reflection(Some(yesterday), "quiet day, good book").unwrap();

    assert_eq!(session.reflection_for(yesterday).unwrap(), "quiet day, good book");
    assert_eq!(session.reflection_for(clock.today()).unwrap(), "");
    assert_eq!(session.journal().len(), 1);
}
