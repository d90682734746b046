use serde::Deserialize;

fn default_database_url() -> String {
    "postgres://postgres@localhost:5432/surveys?sslmode=disable".into()
}

fn default_output_dir() -> String {
    "out".into()
}

fn default_api_base() -> String {
    "https://api.openai.com".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_batch_size() -> usize {
    250
}

fn default_min_words() -> usize {
    3
}

fn default_max_parallel() -> usize {
    8
}

fn default_max_parallel_questions() -> usize {
    4
}

fn default_output_language() -> String {
    "Swedish".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub survey_name: Option<String>,
    /// JSON survey file; takes precedence over the database when set.
    #[serde(default)]
    pub answers_file: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_api_base")]
    pub openai_api_base: String,
    #[serde(default = "default_model")]
    pub discovery_model: String,
    #[serde(default = "default_model")]
    pub tagging_model: String,
    #[serde(default)]
    pub openai_temperature: f32,
    #[serde(default = "default_timeout_ms")]
    pub openai_timeout_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_max_parallel_questions")]
    pub max_parallel_questions: usize,
    #[serde(default = "default_output_language")]
    pub output_language: String,
    #[serde(default = "default_true")]
    pub insert_missing_general: bool,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_config(
            config::Config::builder()
                .add_source(config::Environment::default())
                .build()?,
        )
    }

    pub fn from_config(cfg: config::Config) -> Result<Self, config::ConfigError> {
        cfg.try_deserialize()
    }
}
