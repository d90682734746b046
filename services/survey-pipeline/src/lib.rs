//! Two-stage survey analysis: discover a canonical theme set per question,
//! then tag every answer with themes, sentiment and urgency.

pub mod batching;
pub mod discovery;
pub mod export;
pub mod input;
pub mod prompts;
pub mod runner;
pub mod tagging;

pub use batching::BatchSplitter;
pub use discovery::ThemeDiscoveryStage;
pub use runner::QuestionOrchestrator;
pub use tagging::AnswerTaggingStage;
