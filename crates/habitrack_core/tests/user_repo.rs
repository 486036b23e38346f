use chrono::NaiveDate;
use habitrack_core::db::open_db_in_memory;
use habitrack_core::model::user::{
    ItemEntry, MoodEntry, Reflection, Reminder, Stats, UserPatch, UserRecord, UserValidationError,
};
use habitrack_core::{Mood, RepoError, SqliteUserRepository, UserRepository};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn registered(repo: &SqliteUserRepository<'_>, username: &str) -> UserRecord {
    let user = UserRecord::registered(username, day(1));
    repo.create_user(&user, "pw").unwrap();
    user
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);

    let mut user = UserRecord::registered("alice", day(1));
    user.goals.push(ItemEntry::new("run", 10));
    user.habits.push(ItemEntry::new("floss", 11));
    user.reminders.push(Reminder {
        goal_id: user.goals[0].id,
        time: "07:15".to_string(),
        active: true,
    });
    repo.create_user(&user, "pw").unwrap();

    let loaded = repo.get_user("alice").unwrap().unwrap();
    assert_eq!(loaded, user);
    assert!(repo.get_user("bob").unwrap().is_none());
}

#[test]
fn duplicate_username_and_empty_password_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    registered(&repo, "alice");

    let again = UserRecord::registered("alice", day(2));
    assert!(matches!(
        repo.create_user(&again, "other"),
        Err(RepoError::AlreadyExists(name)) if name == "alice"
    ));
    let bob = UserRecord::registered("bob", day(2));
    assert!(matches!(
        repo.create_user(&bob, ""),
        Err(RepoError::Validation(UserValidationError::EmptyPassword))
    ));
}

#[test]
fn password_check_is_exact() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    registered(&repo, "alice");

    assert!(repo.check_password("alice", "pw").unwrap());
    assert!(!repo.check_password("alice", "PW").unwrap());
    assert!(!repo.check_password("nobody", "pw").unwrap());
}

#[test]
fn update_merges_only_present_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    let user = registered(&repo, "alice");

    let patch = UserPatch {
        goals: Some(vec![ItemEntry::new("read", 5)]),
        stats: Some(Stats {
            goals_completed: 2,
            habits_completed: 1,
            streak: 0,
        }),
        ..UserPatch::default()
    };
    repo.update_user("alice", &patch).unwrap();

    let loaded = repo.get_user("alice").unwrap().unwrap();
    assert_eq!(loaded.goals.len(), 1);
    assert_eq!(loaded.goals[0].text, "read");
    assert_eq!(loaded.stats.goals_completed, 2);
    assert_eq!(loaded.moods, user.moods);
    assert_eq!(loaded.unlocked_badges, user.unlocked_badges);
    assert_eq!(loaded.suggestions, user.suggestions);
}

#[test]
fn update_never_touches_reflections() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    let mut user = registered(&repo, "alice");
    repo.append_reflection("alice", &Reflection::new("kept", None, 100))
        .unwrap();

    user.reflections.clear();
    repo.update_user("alice", &UserPatch::from_record(&user))
        .unwrap();

    let texts: Vec<_> = repo
        .list_reflections("alice")
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();
    assert_eq!(texts, vec!["kept".to_string()]);
}

#[test]
fn update_rejects_unknown_user_and_invalid_patch() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    registered(&repo, "alice");

    assert!(matches!(
        repo.update_user("ghost", &UserPatch::default()),
        Err(RepoError::NotFound(_))
    ));
    let duplicate_badges = UserPatch {
        unlocked_badges: Some(vec!["custom".to_string(), "custom".to_string()]),
        ..UserPatch::default()
    };
    assert!(matches!(
        repo.update_user("alice", &duplicate_badges),
        Err(RepoError::Validation(UserValidationError::DuplicateBadge(_)))
    ));
}

#[test]
fn mood_upsert_overwrites_mood_and_keeps_snapshot() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    registered(&repo, "alice");

    let first = MoodEntry {
        date: day(4),
        mood: Mood::Good,
        completed_goals: 2,
        completed_habits: 1,
    };
    repo.upsert_mood("alice", &first).unwrap();
    let second = repo
        .upsert_mood(
            "alice",
            &MoodEntry {
                mood: Mood::Terrible,
                completed_goals: 9,
                ..first
            },
        )
        .unwrap();

    assert_eq!(second.mood, Mood::Terrible);
    assert_eq!(second.completed_goals, 2);
    let moods = repo.get_user("alice").unwrap().unwrap().moods;
    assert_eq!(moods.iter().filter(|m| m.date == day(4)).count(), 1);
}

#[test]
fn reflections_are_listed_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    registered(&repo, "alice");

    repo.append_reflection("alice", &Reflection::new("first", Some(Mood::Okay), 100))
        .unwrap();
    repo.append_reflection("alice", &Reflection::new("second", None, 200))
        .unwrap();
    repo.append_reflection("alice", &Reflection::new("same-time", None, 200))
        .unwrap();

    let texts: Vec<_> = repo
        .list_reflections("alice")
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();
    assert_eq!(texts, vec!["same-time", "second", "first"]);
}

#[test]
fn blank_reflection_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    registered(&repo, "alice");

    assert!(matches!(
        repo.append_reflection("alice", &Reflection::new("  ", None, 1)),
        Err(RepoError::Validation(UserValidationError::BlankJournalText))
    ));
}

#[test]
fn leaderboard_orders_by_goals_habits_streak_then_name() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::new(&conn);
    for (name, goals, habits, streak) in [
        ("dora", 1, 0, 0),
        ("carl", 3, 0, 0),
        ("bea", 3, 2, 0),
        ("abe", 3, 2, 0),
        ("eve", 3, 2, 4),
    ] {
        registered(&repo, name);
        let patch = UserPatch {
            stats: Some(Stats {
                goals_completed: goals,
                habits_completed: habits,
                streak,
            }),
            ..UserPatch::default()
        };
        repo.update_user(name, &patch).unwrap();
    }

    let names: Vec<_> = repo
        .leaderboard(4)
        .unwrap()
        .into_iter()
        .map(|entry| entry.username)
        .collect();
    assert_eq!(names, vec!["eve", "abe", "bea", "carl"]);
}
