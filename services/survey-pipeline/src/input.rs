//! Survey input from a JSON file, for runs without the database.
//!
//! ```json
//! {
//!   "survey": { "name": "Staff 2024", "description": "Yearly staff survey" },
//!   "questions": [{ "question_id": 1, "text": "Comment?" }],
//!   "answers": [{ "answer_id": 10, "question_id": 1, "text": "..." }]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use shared::db::{AnswerStore, StoredSurvey};
use shared::dto::{Answer, Question, SurveyContext};
use shared::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct SurveyFile {
    pub survey: SurveyContext,
    #[serde(default)]
    pub survey_id: i32,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

pub struct JsonFileStore {
    file: SurveyFile,
}

impl JsonFileStore {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self {
            file: serde_json::from_str(raw)?,
        })
    }

    pub fn survey_name(&self) -> &str {
        &self.file.survey.name
    }
}

#[async_trait]
impl AnswerStore for JsonFileStore {
    async fn fetch_survey(&self, name: &str) -> Result<StoredSurvey> {
        if self.file.survey.name != name {
            return Err(AppError::NotFound(format!("survey {name}")));
        }
        Ok(StoredSurvey {
            survey_id: self.file.survey_id,
            context: self.file.survey.clone(),
        })
    }

    async fn fetch_questions(&self, _survey_id: i32) -> Result<Vec<Question>> {
        Ok(self.file.questions.clone())
    }

    async fn fetch_answers(&self, question_ids: &[i32]) -> Result<Vec<Answer>> {
        Ok(self
            .file
            .answers
            .iter()
            .filter(|a| question_ids.contains(&a.question_id))
            .cloned()
            .collect())
    }
}
