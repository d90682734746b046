//! Answer tagging: one schema-constrained request per answer, restricted to
//! the offered themes of the question.
//!
//! Decoding is atomic per answer. A reply that is malformed, unavailable or
//! names a theme outside the offered set drops every row of that answer and
//! is recorded as a `UnitFailure`; the other answers of the batch are kept.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use shared::dto::{
    Answer, AnswerSentiment, AnswerTag, Question, Scale, Stage, SurveyContext, ThemeSet,
    UnitFailure,
};
use shared::error::PipelineError;
use shared::openai_client::{GenerationClient, PromptedRequest};

use crate::batching::BatchSplitter;
use crate::prompts::{self, PromptVars, TemplateKind};

#[derive(Deserialize)]
struct AnswerThemes {
    themes: Vec<TagRecord>,
}

#[derive(Deserialize)]
struct TagRecord {
    theme: String,
    sentiment: AnswerSentiment,
    urgency: Scale,
}

pub struct AnswerTaggingStage {
    client: Arc<dyn GenerationClient>,
    splitter: BatchSplitter,
}

impl AnswerTaggingStage {
    pub fn new(client: Arc<dyn GenerationClient>, splitter: BatchSplitter) -> Self {
        Self { client, splitter }
    }

    /// Tag every eligible answer of `question` against `themes`.
    pub async fn tag(
        &self,
        survey: &SurveyContext,
        question: &Question,
        themes: &ThemeSet,
        answers: &[Answer],
        failures: &mut Vec<UnitFailure>,
    ) -> Result<Vec<AnswerTag>, PipelineError> {
        let qid = question.question_id;
        let Some(schema) = prompts::tagging_schema(themes) else {
            info!(question_id = qid, "no themes besides General, skipping tagging");
            return Ok(Vec::new());
        };
        let options = prompts::format_theme_options(themes);

        let mut tags = Vec::new();
        for batch in self.splitter.split(answers, qid) {
            let by_key: HashMap<String, &Answer> = batch
                .answers
                .iter()
                .map(|a| (a.answer_id.to_string(), *a))
                .collect();

            let requests = batch
                .answers
                .iter()
                .map(|a| {
                    let vars: PromptVars = [
                        ("survey_description", survey.description.as_str()),
                        ("question", question.text.as_str()),
                        ("themes", options.as_str()),
                        ("answer", a.text.as_deref().unwrap_or_default()),
                    ]
                    .into();
                    prompts::render(TemplateKind::AnswerTagging, &vars)
                        .map(|p| PromptedRequest::new(a.answer_id.to_string(), p))
                })
                .collect::<Result<Vec<_>, _>>()?;

            debug!(
                question_id = qid,
                batch = batch.index,
                answers = requests.len(),
                "tagging batch"
            );
            let replies = self.client.invoke_batch(requests, &schema).await;

            let before = tags.len();
            for reply in replies {
                let rows = match by_key.get(reply.correlation_key.as_str()) {
                    Some(answer) => reply
                        .result
                        .and_then(|r| r.decode::<AnswerThemes>())
                        .and_then(|decoded| flatten(answer, themes, decoded)),
                    None => Err(PipelineError::ContractViolation(format!(
                        "reply for unknown answer {}",
                        reply.correlation_key
                    ))),
                };
                match rows {
                    Ok(rows) => tags.extend(rows),
                    Err(error) => {
                        warn!(
                            question_id = qid,
                            answer_id = %reply.correlation_key,
                            %error,
                            "dropping answer tags"
                        );
                        failures.push(UnitFailure {
                            question_id: qid,
                            stage: Stage::Tagging,
                            unit: reply.correlation_key,
                            error,
                        });
                    }
                }
            }
            debug!(
                question_id = qid,
                batch = batch.index,
                rows = tags.len() - before,
                "batch tagged"
            );
        }

        info!(question_id = qid, rows = tags.len(), "answers tagged");
        Ok(tags)
    }
}

/// One row per distinct theme of the answer; repeated themes keep their
/// first occurrence.
fn flatten(
    answer: &Answer,
    themes: &ThemeSet,
    decoded: AnswerThemes,
) -> Result<Vec<AnswerTag>, PipelineError> {
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(decoded.themes.len());
    for rec in decoded.themes {
        if !themes.offers(&rec.theme) {
            return Err(PipelineError::ContractViolation(format!(
                "answer {} tagged with theme `{}` outside the offered set",
                answer.answer_id, rec.theme
            )));
        }
        if !seen.insert(rec.theme.clone()) {
            continue;
        }
        rows.push(AnswerTag {
            answer_id: answer.answer_id,
            question_id: answer.question_id,
            theme_name: rec.theme,
            sentiment: rec.sentiment,
            urgency: rec.urgency,
        });
    }
    Ok(rows)
}
