use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tracing::{error, info};

use shared::config::Settings;
use shared::dto::{
    Answer, AnswerTag, FailedQuestion, PipelineOutput, Question, SurveyContext, TaggedAnswer,
    ThemeSet, UnitFailure,
};
use shared::error::PipelineError;
use shared::openai_client::GenerationClient;

use crate::batching::BatchSplitter;
use crate::discovery::ThemeDiscoveryStage;
use crate::tagging::AnswerTaggingStage;

/// Runs discovery then tagging for every question, several questions at a
/// time, and merges the per-question results once each task has finished.
pub struct QuestionOrchestrator {
    discovery: ThemeDiscoveryStage,
    tagging: AnswerTaggingStage,
    max_parallel_questions: usize,
}

struct QuestionRun {
    result: Result<(ThemeSet, Vec<AnswerTag>), PipelineError>,
    failures: Vec<UnitFailure>,
}

impl QuestionOrchestrator {
    pub fn new(
        discovery: ThemeDiscoveryStage,
        tagging: AnswerTaggingStage,
        max_parallel_questions: usize,
    ) -> Self {
        Self {
            discovery,
            tagging,
            max_parallel_questions: max_parallel_questions.max(1),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        discovery_client: Arc<dyn GenerationClient>,
        tagging_client: Arc<dyn GenerationClient>,
    ) -> Self {
        let splitter = BatchSplitter::new(settings.batch_size, settings.min_words);
        Self::new(
            ThemeDiscoveryStage::new(
                discovery_client,
                splitter,
                &settings.output_language,
                settings.insert_missing_general,
            ),
            AnswerTaggingStage::new(tagging_client, splitter),
            settings.max_parallel_questions,
        )
    }

    async fn run_question(
        &self,
        survey: &SurveyContext,
        question: &Question,
        answers: &[Answer],
    ) -> QuestionRun {
        let mut failures = Vec::new();
        let themes = match self
            .discovery
            .discover(survey, question, answers, &mut failures)
            .await
        {
            Ok(themes) => themes,
            Err(e) => {
                return QuestionRun {
                    result: Err(e),
                    failures,
                }
            }
        };
        let result = self
            .tagging
            .tag(survey, question, &themes, answers, &mut failures)
            .await
            .map(|tags| (themes, tags));
        QuestionRun { result, failures }
    }

    /// Process `questions` against `answers`.
    ///
    /// Output is ordered by the question list, then by answer order, no
    /// matter which question finishes first. Failed questions are left out
    /// of the table and theme map and named in the failure report.
    pub async fn run(
        &self,
        survey: &SurveyContext,
        questions: &[Question],
        answers: &[Answer],
    ) -> PipelineOutput {
        info!(
            questions = questions.len(),
            answers = answers.len(),
            max_parallel_questions = self.max_parallel_questions,
            "pipeline run started"
        );

        let mut runs: Vec<(usize, QuestionRun)> = stream::iter(questions.iter().enumerate())
            .map(|(idx, question)| async move {
                (idx, self.run_question(survey, question, answers).await)
            })
            .buffer_unordered(self.max_parallel_questions)
            .collect()
            .await;
        runs.sort_by_key(|(idx, _)| *idx);

        let by_id: HashMap<(i32, i64), &Answer> = answers
            .iter()
            .map(|a| ((a.question_id, a.answer_id), a))
            .collect();

        let mut output = PipelineOutput::default();
        for (idx, run) in runs {
            let question = &questions[idx];
            output.failures.unit_failures.extend(run.failures);
            match run.result {
                Ok((themes, tags)) => {
                    output.table.extend(tags.into_iter().map(|tag| TaggedAnswer {
                        answer: by_id
                            .get(&(tag.question_id, tag.answer_id))
                            .and_then(|a| a.text.clone())
                            .unwrap_or_default(),
                        question: question.text.clone(),
                        answer_id: tag.answer_id,
                        question_id: tag.question_id,
                        theme: tag.theme_name,
                        sentiment: tag.sentiment,
                        urgency: tag.urgency,
                    }));
                    output.themes.insert(question.question_id, themes);
                }
                Err(e) => {
                    error!(
                        question_id = question.question_id,
                        question = %question.text,
                        error = %e,
                        "question failed"
                    );
                    output.failures.failed_questions.push(FailedQuestion {
                        question_id: question.question_id,
                        question: question.text.clone(),
                        error: e,
                    });
                }
            }
        }

        info!(
            rows = output.table.len(),
            themed_questions = output.themes.len(),
            failed_questions = output.failures.failed_questions.len(),
            unit_failures = output.failures.unit_failures.len(),
            "pipeline run finished"
        );
        output
    }
}
