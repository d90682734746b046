//! Survey data model shared between the data store, the generation client
//! and the pipeline stages.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use tracing::warn;

use crate::error::PipelineError;

/// Reserved theme summarising the overall opinion on a question.
pub const GENERAL_THEME: &str = "General";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyContext {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: i32,
    pub text: String,
}

/// One raw survey response. Owned by the data store, only borrowed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer_id: i64,
    pub question_id: i32,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub numeric_value: Option<f64>,
}

impl Answer {
    pub fn word_count(&self) -> usize {
        self.text
            .as_deref()
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0)
    }
}

/// Integer score on the closed range 1..=5 (frequency, urgency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Scale(u8);

impl Scale {
    pub const MIN: Scale = Scale(1);

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Scale {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        if (1..=5).contains(&v) {
            Ok(Scale(v as u8))
        } else {
            Err(format!("scale value {v} outside 1..=5"))
        }
    }
}

impl From<Scale> for u8 {
    fn from(s: Scale) -> u8 {
        s.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThemeSentiment {
    Positive,
    Negative,
    Neutral,
    Neither,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnswerSentiment {
    Positive,
    Negative,
    Neutral,
    Neither,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(rename = "theme_name")]
    pub name: String,
    #[serde(rename = "theme_description")]
    pub description: String,
    pub sentiment: ThemeSentiment,
    pub frequency: Scale,
    pub urgency: Scale,
}

impl Theme {
    pub fn is_general(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(GENERAL_THEME)
    }

    /// Placeholder inserted when consolidation forgets the `General` theme.
    pub fn default_general() -> Self {
        Theme {
            name: GENERAL_THEME.to_string(),
            description: String::new(),
            sentiment: ThemeSentiment::Neutral,
            frequency: Scale::MIN,
            urgency: Scale::MIN,
        }
    }
}

/// Canonical themes of one question: names are unique (case-insensitive)
/// and exactly one of them is `General`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ThemeSet {
    themes: Vec<Theme>,
}

impl ThemeSet {
    /// Build the canonical set from consolidated themes.
    ///
    /// Later duplicates of a name are dropped. A `General` theme spelled any
    /// other way is renamed, and a missing one is a contract violation: with
    /// `insert_missing_general` the default one is appended, otherwise it is
    /// returned as the error. Renames and insertions are returned alongside
    /// the set.
    pub fn from_consolidated(
        consolidated: Vec<Theme>,
        insert_missing_general: bool,
    ) -> Result<(Self, Vec<PipelineError>), PipelineError> {
        let mut violations = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut themes = Vec::with_capacity(consolidated.len() + 1);

        for mut theme in consolidated {
            theme.name = theme.name.trim().to_string();
            if theme.name.is_empty() {
                warn!("dropping consolidated theme with empty name");
                continue;
            }
            if theme.is_general() && theme.name != GENERAL_THEME {
                violations.push(PipelineError::ContractViolation(format!(
                    "theme `{}` renamed to `{GENERAL_THEME}`",
                    theme.name
                )));
                theme.name = GENERAL_THEME.to_string();
            }
            if !seen.insert(theme.name.to_lowercase()) {
                warn!(theme = %theme.name, "dropping duplicate consolidated theme");
                continue;
            }
            themes.push(theme);
        }

        if !themes.iter().any(Theme::is_general) {
            let err = PipelineError::ContractViolation(format!(
                "consolidated theme set has no `{GENERAL_THEME}` theme"
            ));
            if !insert_missing_general {
                return Err(err);
            }
            themes.push(Theme::default_general());
            violations.push(err);
        }

        Ok((ThemeSet { themes }, violations))
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn general(&self) -> Option<&Theme> {
        self.themes.iter().find(|t| t.is_general())
    }

    /// Themes an individual answer may be tagged with.
    pub fn offered(&self) -> impl Iterator<Item = &Theme> {
        self.themes.iter().filter(|t| !t.is_general())
    }

    pub fn offers(&self, name: &str) -> bool {
        self.offered().any(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

pub type ThemeMap = BTreeMap<i32, ThemeSet>;

/// One (answer, theme) assignment produced by the tagging stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerTag {
    pub answer_id: i64,
    pub question_id: i32,
    pub theme_name: String,
    pub sentiment: AnswerSentiment,
    pub urgency: Scale,
}

/// A tag row joined back to its question and answer text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedAnswer {
    pub answer_id: i64,
    pub question_id: i32,
    pub question: String,
    pub answer: String,
    pub theme: String,
    pub sentiment: AnswerSentiment,
    pub urgency: Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Discovery,
    Consolidation,
    Tagging,
}

/// A batch or answer whose contribution was dropped, or replaced by a
/// documented fallback, without failing its question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub question_id: i32,
    pub stage: Stage,
    /// Correlation key of the dropped request.
    pub unit: String,
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedQuestion {
    pub question_id: i32,
    pub question: String,
    pub error: PipelineError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureReport {
    pub failed_questions: Vec<FailedQuestion>,
    pub unit_failures: Vec<UnitFailure>,
}

impl FailureReport {
    pub fn is_empty(&self) -> bool {
        self.failed_questions.is_empty() && self.unit_failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub table: Vec<TaggedAnswer>,
    pub themes: ThemeMap,
    pub failures: FailureReport,
}
