//! Goal/habit suggestions.
//!
//! # Responsibility
//! - Normalize suggestions coming from an external text-analysis provider.
//! - Produce local heuristic suggestions from stats and mood.
//!
//! # Invariants
//! - Provider output is accepted only as exactly five sentences.
//! - Every path falls back to `[DEFAULT_SUGGESTION]` instead of failing.

use crate::model::mood::Mood;
use crate::model::user::{ItemKind, UserRecord, DEFAULT_SUGGESTION};
use chrono::NaiveDate;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Number of suggestions a provider must return.
pub const SUGGESTION_COUNT: usize = 5;

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\n?|\n?```").expect("valid code fence regex"));

const RELATED_TOPICS: &[(&str, &str)] = &[
    ("exercise", "fitness or nutrition"),
    ("read", "learning or personal development"),
    ("study", "academic achievement or skill development"),
    ("work", "career growth or professional development"),
    ("sleep", "health or wellness"),
    ("meditate", "mindfulness or stress management"),
];

/// Suggestion provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionError(pub String);

impl Display for SuggestionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "suggestion provider failed: {}", self.0)
    }
}

impl Error for SuggestionError {}

/// External collaborator that turns a journal entry into goal ideas.
pub trait SuggestionProvider {
    fn suggest(&self, journal_entry: &str, mood: Option<Mood>)
        -> Result<Vec<String>, SuggestionError>;
}

/// Text backend adapter: sends [`suggestion_prompt`] through `fetch` and
/// parses the reply with [`parse_suggestion_payload`].
pub struct PayloadProvider<F> {
    fetch: F,
}

impl<F> PayloadProvider<F>
where
    F: Fn(&str) -> Result<String, SuggestionError>,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> SuggestionProvider for PayloadProvider<F>
where
    F: Fn(&str) -> Result<String, SuggestionError>,
{
    fn suggest(
        &self,
        journal_entry: &str,
        mood: Option<Mood>,
    ) -> Result<Vec<String>, SuggestionError> {
        let payload = (self.fetch)(&suggestion_prompt(journal_entry, mood))?;
        parse_suggestion_payload(&payload)
    }
}

/// Instruction for a text-analysis backend asking for five suggestions as a
/// JSON array of strings.
pub fn suggestion_prompt(journal_entry: &str, mood: Option<Mood>) -> String {
    let mood = mood.map_or("unknown", Mood::as_str);
    format!(
        "Analyze this journal entry and mood, then provide exactly {count} \
         personalized suggestions for goals or habits that would be beneficial.\n\n\
         Journal Entry: {journal_entry:?}\n\
         Current Mood: {mood}\n\n\
         Return ONLY a JSON array of exactly {count} strings. Each suggestion \
         must be one complete sentence that starts with a capital letter and ends with a period.",
        count = SUGGESTION_COUNT,
    )
}

/// Capitalizes the first letter and guarantees a trailing period.
pub fn format_suggestion(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let mut formatted = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if !formatted.ends_with('.') {
        formatted.push('.');
    }
    formatted
}

/// Formats provider output; `None` unless there are exactly five non-blank items.
pub fn normalize_suggestions(raw: Vec<String>) -> Option<Vec<String>> {
    if raw.len() != SUGGESTION_COUNT || raw.iter().any(|item| item.trim().is_empty()) {
        return None;
    }
    Some(raw.iter().map(|item| format_suggestion(item)).collect())
}

/// Parses a provider's text reply: a JSON array of strings, optionally
/// wrapped in a markdown code fence.
pub fn parse_suggestion_payload(payload: &str) -> Result<Vec<String>, SuggestionError> {
    let cleaned = CODE_FENCE_RE.replace_all(payload.trim(), "");
    serde_json::from_str::<Vec<String>>(cleaned.trim())
        .map_err(|err| SuggestionError(format!("invalid suggestion payload: {err}")))
}

/// Asks `provider` for suggestions, falling back to the default on any
/// failure or malformed result.
pub fn suggestions_from_journal(
    provider: Option<&dyn SuggestionProvider>,
    journal_entry: &str,
    mood: Option<Mood>,
) -> Vec<String> {
    let Some(provider) = provider else {
        return fallback();
    };
    match provider.suggest(journal_entry, mood) {
        Ok(raw) => normalize_suggestions(raw).unwrap_or_else(|| {
            warn!("event=suggest module=suggestion status=rejected reason=shape");
            fallback()
        }),
        Err(err) => {
            warn!("event=suggest module=suggestion status=error error={err}");
            fallback()
        }
    }
}

/// Local suggestions derived from the last in-place completed goal and the
/// mood of `today` (or the latest recorded mood).
pub fn heuristic_suggestions(user: &UserRecord, today: NaiveDate) -> Vec<String> {
    let mut suggestions = Vec::new();

    if let Some(goal) = user.items(ItemKind::Goal).iter().rev().find(|g| g.completed) {
        suggestions.push(format!(
            "Based on your completed goal \"{}\", you might enjoy setting a goal about {}",
            goal.text,
            related_topic(&goal.text)
        ));
    }

    match user.current_mood(today) {
        Some(mood) if mood.is_positive() => suggestions.push(
            "You're in a good mood! Try setting a challenging or exciting goal today.".to_string(),
        ),
        Some(Mood::Okay) => suggestions.push(
            "Feeling okay? Maybe set a small, achievable goal to boost your mood.".to_string(),
        ),
        Some(_) => suggestions.push(
            "If you're not feeling your best, consider a self-care or wellness goal.".to_string(),
        ),
        None => {}
    }

    if suggestions.is_empty() {
        return fallback();
    }
    suggestions
}

/// Topic related to a goal text, matched by keyword.
pub fn related_topic(goal_text: &str) -> &'static str {
    let lowered = goal_text.to_lowercase();
    RELATED_TOPICS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or("personal growth", |(_, topic)| topic)
}

fn fallback() -> Vec<String> {
    vec![DEFAULT_SUGGESTION.to_string()]
}
