//! Daily mood scale.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Five-step mood scale, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Great,
    Good,
    Okay,
    Bad,
    Terrible,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Great,
        Mood::Good,
        Mood::Okay,
        Mood::Bad,
        Mood::Terrible,
    ];

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Great => "Great",
            Self::Good => "Good",
            Self::Okay => "Okay",
            Self::Bad => "Bad",
            Self::Terrible => "Terrible",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Great => "😊",
            Self::Good => "🙂",
            Self::Okay => "😐",
            Self::Bad => "😔",
            Self::Terrible => "😢",
        }
    }

    /// Whether this mood counts as a positive day.
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Great | Self::Good)
    }
}

impl Display for Mood {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown mood name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMoodError(pub String);

impl Display for ParseMoodError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown mood `{}`; expected Great|Good|Okay|Bad|Terrible",
            self.0
        )
    }
}

impl Error for ParseMoodError {}

impl FromStr for Mood {
    type Err = ParseMoodError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|mood| mood.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseMoodError(trimmed.to_string()))
    }
}
