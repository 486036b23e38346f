//! Achievement unlock engine.
//!
//! # Responsibility
//! - Evaluate every badge rule against the current user document.
//! - Record first-time unlocks in `unlocked_badges` and queue one
//!   notification per unlock.
//!
//! # Invariants
//! - A key enters `unlocked_badges` at most once and is never removed here.
//! - Within one engine (one session) a key is notified at most once, even if
//!   the document is reloaded without it.
//! - The participation badge notifies only while it is the sole unlocked key.
//! - Badge display state depends on the rule alone, never on notification.

use crate::model::badge::{BadgeDefinition, BADGES};
use crate::model::user::UserRecord;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeSet;

/// Evaluation outcome for one badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeStatus {
    pub badge: &'static BadgeDefinition,
    /// True only on the pass that first recorded the unlock this session.
    pub newly_unlocked: bool,
    /// Current rule result; drives locked/unlocked styling.
    pub unlocked: bool,
}

/// Outcome of one evaluation pass, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub statuses: Vec<BadgeStatus>,
    /// Whether `unlocked_badges` grew during the pass.
    pub changed: bool,
}

impl EvaluationResult {
    pub fn newly_unlocked_keys(&self) -> Vec<&'static str> {
        self.statuses
            .iter()
            .filter(|status| status.newly_unlocked)
            .map(|status| status.badge.key)
            .collect()
    }

    pub fn views(&self) -> Vec<BadgeView> {
        self.statuses
            .iter()
            .map(|status| BadgeView::new(status.badge, status.unlocked))
            .collect()
    }
}

/// Render model of one badge tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeView {
    pub key: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
}

impl BadgeView {
    fn new(badge: &'static BadgeDefinition, unlocked: bool) -> Self {
        Self {
            key: badge.key,
            label: badge.label,
            emoji: badge.emoji,
            description: badge.description,
            unlocked,
        }
    }
}

/// One-time popup request for a freshly unlocked badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementNotification {
    pub badge: &'static BadgeDefinition,
}

/// Session-scoped unlock evaluator.
///
/// Each instance owns its own notified set, so independent sessions (and
/// tests) never suppress each other's popups.
pub struct AchievementEngine {
    catalog: &'static [BadgeDefinition],
    notified_this_session: BTreeSet<&'static str>,
    pending: Vec<AchievementNotification>,
}

impl Default for AchievementEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AchievementEngine {
    pub fn new() -> Self {
        Self::with_catalog(BADGES)
    }

    pub fn with_catalog(catalog: &'static [BadgeDefinition]) -> Self {
        Self {
            catalog,
            notified_this_session: BTreeSet::new(),
            pending: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &'static [BadgeDefinition] {
        self.catalog
    }

    /// Runs one evaluation pass, mutating `user.unlocked_badges`.
    ///
    /// `was_unlocked` is judged against the unlocked set as it stood before
    /// the pass. The caller persists `user` when `changed` is true.
    pub fn evaluate(&mut self, user: &mut UserRecord) -> EvaluationResult {
        let unlocked_before: BTreeSet<String> = user.unlocked_badges.iter().cloned().collect();
        let mut statuses = Vec::with_capacity(self.catalog.len());
        let mut changed = false;

        for badge in self.catalog {
            let was_unlocked = unlocked_before.contains(badge.key);
            let is_unlocked = badge.is_unlocked_for(user);
            let first_time = is_unlocked
                && !was_unlocked
                && !self.notified_this_session.contains(badge.key);

            if first_time {
                let notify = !badge.is_participation()
                    || user
                        .unlocked_badges
                        .iter()
                        .all(|key| key.as_str() == badge.key);
                if notify {
                    info!(
                        "event=badge_unlock module=achievement status=notify badge={}",
                        badge.key
                    );
                    self.pending.push(AchievementNotification { badge });
                } else {
                    debug!(
                        "event=badge_unlock module=achievement status=silent badge={}",
                        badge.key
                    );
                }
                changed |= user.unlock_badge(badge.key);
                self.notified_this_session.insert(badge.key);
            }

            statuses.push(BadgeStatus {
                badge,
                newly_unlocked: first_time,
                unlocked: is_unlocked,
            });
        }

        EvaluationResult { statuses, changed }
    }

    /// Badge tiles for `user` without touching any state.
    pub fn views(&self, user: &UserRecord) -> Vec<BadgeView> {
        self.catalog
            .iter()
            .map(|badge| BadgeView::new(badge, badge.is_unlocked_for(user)))
            .collect()
    }

    /// Drains notifications queued by previous passes, oldest first.
    pub fn take_notifications(&mut self) -> Vec<AchievementNotification> {
        std::mem::take(&mut self.pending)
    }

    pub fn was_notified_this_session(&self, key: &str) -> bool {
        self.notified_this_session.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::AchievementEngine;
    use crate::model::badge::{BadgeDefinition, BadgeRule, PARTICIPATION_BADGE_KEY};
    use crate::model::user::UserRecord;
    use chrono::NaiveDate;

    fn fresh_user() -> UserRecord {
        UserRecord::registered("alice", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn notified_keys(engine: &mut AchievementEngine) -> Vec<&'static str> {
        engine
            .take_notifications()
            .into_iter()
            .map(|n| n.badge.key)
            .collect()
    }

    #[test]
    fn fresh_user_gets_no_popup() {
        let mut engine = AchievementEngine::new();
        let mut user = fresh_user();
        let result = engine.evaluate(&mut user);
        assert!(!result.changed);
        assert!(notified_keys(&mut engine).is_empty());
        let custom = result
            .statuses
            .iter()
            .find(|s| s.badge.key == PARTICIPATION_BADGE_KEY)
            .unwrap();
        assert!(custom.unlocked);
        assert!(!custom.newly_unlocked);
    }

    #[test]
    fn first_goal_notifies_once_per_session() {
        let mut engine = AchievementEngine::new();
        let mut user = fresh_user();
        user.stats.goals_completed = 1;

        let first = engine.evaluate(&mut user);
        assert!(first.changed);
        assert_eq!(first.newly_unlocked_keys(), vec!["firstGoal"]);
        assert_eq!(notified_keys(&mut engine), vec!["firstGoal"]);

        // A stale reload without the key must not re-notify in the same session.
        user.unlocked_badges.retain(|key| key != "firstGoal");
        let second = engine.evaluate(&mut user);
        assert!(second.newly_unlocked_keys().is_empty());
        assert!(notified_keys(&mut engine).is_empty());
    }

    #[test]
    fn badge_unlocked_in_previous_session_never_notifies() {
        let mut user = fresh_user();
        user.stats.goals_completed = 1;
        user.unlocked_badges.push("firstGoal".to_string());

        let mut engine = AchievementEngine::new();
        let result = engine.evaluate(&mut user);
        assert!(!result.changed);
        assert!(notified_keys(&mut engine).is_empty());
        assert!(result.views()[0].unlocked);
    }

    #[test]
    fn participation_badge_notifies_only_when_sole_unlock() {
        let mut engine = AchievementEngine::new();
        let mut user = fresh_user();
        user.unlocked_badges.clear();

        engine.evaluate(&mut user);
        assert_eq!(notified_keys(&mut engine), vec![PARTICIPATION_BADGE_KEY]);
        assert_eq!(user.unlocked_badges, vec![PARTICIPATION_BADGE_KEY]);

        let mut engine = AchievementEngine::new();
        let mut user = fresh_user();
        user.unlocked_badges = vec!["firstGoal".to_string()];
        user.stats.goals_completed = 1;
        let result = engine.evaluate(&mut user);
        assert!(notified_keys(&mut engine).is_empty());
        assert!(result.changed);
        assert!(user.has_badge(PARTICIPATION_BADGE_KEY));
    }

    #[test]
    fn locked_badges_render_locked() {
        let engine = AchievementEngine::new();
        let user = fresh_user();
        let views = engine.views(&user);
        assert_eq!(views.len(), engine.catalog().len());
        assert!(views.iter().filter(|v| v.unlocked).all(|v| v.key == "custom"));
    }

    static STREAK_ONLY: &[BadgeDefinition] = &[BadgeDefinition {
        key: "streak1",
        label: "Streak",
        emoji: "*",
        description: "one day",
        rule: BadgeRule::Streak(1),
    }];

    #[test]
    fn custom_catalog_is_respected() {
        let mut engine = AchievementEngine::with_catalog(STREAK_ONLY);
        let mut user = fresh_user();
        user.stats.streak = 1;
        let result = engine.evaluate(&mut user);
        assert_eq!(result.statuses.len(), 1);
        assert_eq!(result.newly_unlocked_keys(), vec!["streak1"]);
    }
}
