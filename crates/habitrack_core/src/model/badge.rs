//! Static badge catalog.
//!
//! # Responsibility
//! - Define every badge, its display metadata and its unlock rule.
//!
//! # Invariants
//! - Keys are unique across the catalog.
//! - Catalog order is both display order and evaluation order.
//! - Rules are pure functions of a `UserRecord` snapshot.

use crate::model::user::UserRecord;

/// Key of the fallback badge every user holds from registration.
pub const PARTICIPATION_BADGE_KEY: &str = "custom";

/// Unlock predicate of a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeRule {
    GoalsCompleted(u32),
    HabitsCompleted(u32),
    Streak(u32),
    /// Participation badge: always met.
    Always,
}

impl BadgeRule {
    pub fn is_met(self, user: &UserRecord) -> bool {
        match self {
            Self::GoalsCompleted(min) => user.stats.goals_completed >= min,
            Self::HabitsCompleted(min) => user.stats.habits_completed >= min,
            Self::Streak(min) => user.stats.streak >= min,
            Self::Always => true,
        }
    }
}

/// One achievement badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
    pub rule: BadgeRule,
}

impl BadgeDefinition {
    pub fn is_unlocked_for(&self, user: &UserRecord) -> bool {
        self.rule.is_met(user)
    }

    /// Participation badges only notify while nothing else is unlocked.
    pub fn is_participation(&self) -> bool {
        matches!(self.rule, BadgeRule::Always)
    }
}

pub const BADGES: &[BadgeDefinition] = &[
    BadgeDefinition {
        key: "firstGoal",
        label: "First Goal!",
        emoji: "🌱",
        description: "Complete your first goal",
        rule: BadgeRule::GoalsCompleted(1),
    },
    BadgeDefinition {
        key: "goal5",
        label: "5 Goals!",
        emoji: "🎯",
        description: "Complete 5 goals",
        rule: BadgeRule::GoalsCompleted(5),
    },
    BadgeDefinition {
        key: "firstHabit",
        label: "First Habit!",
        emoji: "💧",
        description: "Complete your first habit",
        rule: BadgeRule::HabitsCompleted(1),
    },
    BadgeDefinition {
        key: "habit10",
        label: "10 Habits!",
        emoji: "🌟",
        description: "Complete 10 habits",
        rule: BadgeRule::HabitsCompleted(10),
    },
    BadgeDefinition {
        key: "streak3",
        label: "3 Day Streak!",
        emoji: "🔥",
        description: "3 day streak",
        rule: BadgeRule::Streak(3),
    },
    BadgeDefinition {
        key: "streak7",
        label: "7 Day Streak!",
        emoji: "🏆",
        description: "7 day streak",
        rule: BadgeRule::Streak(7),
    },
    BadgeDefinition {
        key: PARTICIPATION_BADGE_KEY,
        label: "Amaze-Balls!",
        emoji: "🦄",
        description: "Just for being you!",
        rule: BadgeRule::Always,
    },
];

pub fn find_badge(key: &str) -> Option<&'static BadgeDefinition> {
    BADGES.iter().find(|badge| badge.key == key)
}

#[cfg(test)]
mod tests {
    use super::{find_badge, BadgeRule, BADGES, PARTICIPATION_BADGE_KEY};
    use crate::model::user::UserRecord;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    #[test]
    fn catalog_keys_are_unique() {
        let keys: HashSet<_> = BADGES.iter().map(|badge| badge.key).collect();
        assert_eq!(keys.len(), BADGES.len());
    }

    #[test]
    fn participation_badge_is_last_and_always_met() {
        let badge = find_badge(PARTICIPATION_BADGE_KEY).unwrap();
        assert!(badge.is_participation());
        assert_eq!(BADGES.last().map(|b| b.key), Some(PARTICIPATION_BADGE_KEY));
    }

    #[test]
    fn rules_compare_against_stats_thresholds() {
        let mut user = UserRecord::registered("alice", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(!BadgeRule::GoalsCompleted(1).is_met(&user));
        user.stats.goals_completed = 5;
        user.stats.streak = 3;
        assert!(BadgeRule::GoalsCompleted(5).is_met(&user));
        assert!(BadgeRule::Streak(3).is_met(&user));
        assert!(!BadgeRule::Streak(7).is_met(&user));
        assert!(!BadgeRule::HabitsCompleted(1).is_met(&user));
    }
}
