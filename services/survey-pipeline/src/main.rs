use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use shared::config::Settings;
use shared::db::{AnswerStore, PgAnswerStore};
use shared::openai_client::{GenerationClient, OpenAiClient, OpenAiConfig};
use survey_pipeline::export;
use survey_pipeline::input::JsonFileStore;
use survey_pipeline::QuestionOrchestrator;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = Settings::new().context("loading settings from environment")?;
    let run_id = Uuid::new_v4();
    info!(
        %run_id,
        batch_size = settings.batch_size,
        min_words = settings.min_words,
        max_parallel = settings.max_parallel,
        max_parallel_questions = settings.max_parallel_questions,
        timeout_ms = settings.openai_timeout_ms,
        discovery_model = %settings.discovery_model,
        tagging_model = %settings.tagging_model,
        "settings loaded"
    );
    if settings.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is empty; generation calls will be rejected");
    }

    let (store, file_survey): (Box<dyn AnswerStore>, Option<String>) =
        match &settings.answers_file {
            Some(path) => {
                let store = JsonFileStore::load(path)
                    .await
                    .with_context(|| format!("reading survey file {path}"))?;
                let name = store.survey_name().to_string();
                (Box::new(store) as Box<dyn AnswerStore>, Some(name))
            }
            None => {
                let store = PgAnswerStore::connect(&settings.database_url)
                    .await
                    .context("connecting to the survey database")?;
                (Box::new(store) as Box<dyn AnswerStore>, None)
            }
        };

    let survey_name = settings
        .survey_name
        .clone()
        .or(file_survey)
        .context("SURVEY_NAME must be set when reading from the database")?;
    let survey = store.fetch_survey(&survey_name).await?;
    let questions = store.fetch_questions(survey.survey_id).await?;
    let question_ids: Vec<i32> = questions.iter().map(|q| q.question_id).collect();
    let answers = store.fetch_answers(&question_ids).await?;
    info!(
        %run_id,
        survey = %survey.context.name,
        questions = questions.len(),
        answers = answers.len(),
        "loaded survey"
    );

    let discovery_client: Arc<dyn GenerationClient> = Arc::new(OpenAiClient::new(
        OpenAiConfig::from_settings(&settings, &settings.discovery_model),
    )?);
    let tagging_client: Arc<dyn GenerationClient> = Arc::new(OpenAiClient::new(
        OpenAiConfig::from_settings(&settings, &settings.tagging_model),
    )?);

    let orchestrator =
        QuestionOrchestrator::from_settings(&settings, discovery_client, tagging_client);
    let output = orchestrator.run(&survey.context, &questions, &answers).await;

    for failed in &output.failures.failed_questions {
        warn!(
            %run_id,
            question_id = failed.question_id,
            question = %failed.question,
            error = %failed.error,
            "question omitted from output"
        );
    }

    let dir = Path::new(&settings.output_dir).join(run_id.to_string());
    export::write_outputs(&dir, &output).await?;
    info!(%run_id, dir = %dir.display(), rows = output.table.len(), "run complete");
    Ok(())
}
