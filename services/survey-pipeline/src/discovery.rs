//! Theme discovery: per-batch candidate themes, then one consolidation call
//! that merges them into the canonical theme set of a question.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use shared::dto::{Answer, Question, Stage, SurveyContext, Theme, ThemeSet, UnitFailure};
use shared::error::PipelineError;
use shared::openai_client::{GenerationClient, PromptedRequest};

use crate::batching::{Batch, BatchSplitter};
use crate::prompts::{self, PromptVars, TemplateKind};

#[derive(Deserialize)]
struct ThemeList {
    major_themes: Vec<Theme>,
}

pub fn batch_key(question_id: i32, batch: usize) -> String {
    format!("q{question_id}/batch{batch}")
}

pub fn consolidation_key(question_id: i32) -> String {
    format!("q{question_id}/consolidate")
}

pub struct ThemeDiscoveryStage {
    client: Arc<dyn GenerationClient>,
    splitter: BatchSplitter,
    language: String,
    insert_missing_general: bool,
}

impl ThemeDiscoveryStage {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        splitter: BatchSplitter,
        language: &str,
        insert_missing_general: bool,
    ) -> Self {
        Self {
            client,
            splitter,
            language: language.to_string(),
            insert_missing_general,
        }
    }

    /// Run `Batching -> BatchGeneration -> Consolidation` for one question.
    ///
    /// Batches whose generation fails are pushed to `failures` and left out
    /// of consolidation. A failed consolidation fails the question.
    pub async fn discover(
        &self,
        survey: &SurveyContext,
        question: &Question,
        answers: &[Answer],
        failures: &mut Vec<UnitFailure>,
    ) -> Result<ThemeSet, PipelineError> {
        let qid = question.question_id;
        let batches: Vec<Batch<'_>> = self.splitter.split(answers, qid).collect();
        if batches.is_empty() {
            return Err(PipelineError::NoEligibleAnswers {
                question_id: qid,
                min_words: self.splitter.min_words(),
            });
        }

        let schema = prompts::discovery_schema(&self.language);
        let requests = batches
            .iter()
            .map(|batch| {
                let joined = prompts::join_answers(
                    batch.answers.iter().filter_map(|a| a.text.as_deref()),
                );
                let vars: PromptVars = [
                    ("survey_description", survey.description.as_str()),
                    ("question", question.text.as_str()),
                    ("answers", joined.as_str()),
                ]
                .into();
                prompts::render(TemplateKind::ThemeDiscoveryBatch, &vars)
                    .map(|prompt| PromptedRequest::new(batch_key(qid, batch.index), prompt))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(question_id = qid, batches = requests.len(), "discovering candidate themes");
        let replies = self.client.invoke_batch(requests, &schema).await;

        let mut candidates: Vec<Vec<Theme>> = Vec::with_capacity(replies.len());
        let mut failed_batches = 0usize;
        for reply in replies {
            match reply.result.and_then(|r| r.decode::<ThemeList>()) {
                Ok(list) => candidates.push(list.major_themes),
                Err(error) => {
                    warn!(
                        question_id = qid,
                        batch = %reply.correlation_key,
                        %error,
                        "dropping discovery batch"
                    );
                    failed_batches += 1;
                    failures.push(UnitFailure {
                        question_id: qid,
                        stage: Stage::Discovery,
                        unit: reply.correlation_key,
                        error,
                    });
                }
            }
        }
        if candidates.is_empty() {
            return Err(PipelineError::NoThemeCandidates { failed_batches });
        }

        let summary = prompts::format_theme_summaries(&candidates);
        let vars: PromptVars = [
            ("survey_description", survey.description.as_str()),
            ("question", question.text.as_str()),
            ("answer_summary", summary.as_str()),
        ]
        .into();
        let request = PromptedRequest::new(
            consolidation_key(qid),
            prompts::render(TemplateKind::ThemeDiscoveryConsolidate, &vars)?,
        );

        info!(question_id = qid, candidate_batches = candidates.len(), "consolidating themes");
        let consolidated = self
            .client
            .invoke_one(&request, &schema)
            .await?
            .decode::<ThemeList>()?;

        let (themes, violations) =
            ThemeSet::from_consolidated(consolidated.major_themes, self.insert_missing_general)?;
        for error in violations {
            warn!(question_id = qid, %error, "corrected consolidated theme set");
            failures.push(UnitFailure {
                question_id: qid,
                stage: Stage::Consolidation,
                unit: request.correlation_key.clone(),
                error,
            });
        }

        info!(question_id = qid, themes = themes.len(), "theme set ready");
        Ok(themes)
    }
}
