//! Prompt templates and output schemas for theme discovery and answer tagging.
//!
//! Rendering is a single pass over the template: placeholders are written as
//! `{name}` and substituted values are never scanned again, so answers that
//! happen to contain braces are passed through untouched.

use std::collections::BTreeMap;

use shared::dto::{AnswerSentiment, Theme, ThemeSentiment, ThemeSet};
use shared::error::PipelineError;
use shared::output_schema::{scale_kind, FieldKind, OutputSchema};
use strum::IntoEnumIterator;
use strum_macros::Display;

pub const DISCOVERY_FUNCTION: &str = "survey_theme_identifier";
pub const TAGGING_FUNCTION: &str = "answer_theme_identifier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TemplateKind {
    ThemeDiscoveryBatch,
    ThemeDiscoveryConsolidate,
    AnswerTagging,
}

impl TemplateKind {
    fn template(self) -> &'static str {
        match self {
            TemplateKind::ThemeDiscoveryBatch => THEME_DISCOVERY_BATCH,
            TemplateKind::ThemeDiscoveryConsolidate => THEME_DISCOVERY_CONSOLIDATE,
            TemplateKind::AnswerTagging => ANSWER_TAGGING,
        }
    }

    pub fn required_vars(self) -> &'static [&'static str] {
        match self {
            TemplateKind::ThemeDiscoveryBatch => &["survey_description", "question", "answers"],
            TemplateKind::ThemeDiscoveryConsolidate => {
                &["survey_description", "question", "answer_summary"]
            }
            TemplateKind::AnswerTagging => &["survey_description", "question", "themes", "answer"],
        }
    }
}

const THEME_DISCOVERY_BATCH: &str = "\
You are set to analyze the responses for a survey that is described as this:
<survey_description>{survey_description}</survey_description>

The following content is a set of survey answers for the question: <question>{question}</question>

Answers:
<answers>{answers}</answers>

Instructions:
Based on this list, identify the main themes.
Every theme should have a short name and a well written description of the respondents' opinions.
Pay close attention to the frequency and urgency of the answers.
Include only insights that are prevalent in multiple answers and describe more general opinions.
Always use the survey_theme_identifier function.";

const THEME_DISCOVERY_CONSOLIDATE: &str = "\
You are set to analyze the responses for a survey that is described as this:
<survey_description>{survey_description}</survey_description>

The following are summaries of the main themes for the question <question>{question}</question>, each produced from a different batch of answers:
<answer_summary>{answer_summary}</answer_summary>

Instructions:
Distill these into one final, consolidated list of the main themes.
Keep the list relevant and concise, and merge themes with the same name or intent into one.
Every theme should have a name and a well written description of the respondents' opinions.
Include only insights that describe more general opinions.
Always include a theme called General with an overall summary of the opinions.
Always use the survey_theme_identifier function.";

const ANSWER_TAGGING: &str = "\
You are an expert at tagging survey answers with the themes they cover.
Pay close attention to what the answer says and only use relevant themes as tags.
One answer may cover several themes; give each its own sentiment and urgency.

The survey is described as follows:
<survey_description>{survey_description}</survey_description>

This answer is for the question:
<question>{question}</question>

These are the themes you are allowed to use:
<themes>{themes}</themes>

The respondent's answer: {answer}";

pub type PromptVars<'a> = BTreeMap<&'static str, &'a str>;

/// Render `kind` with `vars`. Fails with `Template` naming the first
/// required variable that is absent.
pub fn render(kind: TemplateKind, vars: &PromptVars<'_>) -> Result<String, PipelineError> {
    for name in kind.required_vars() {
        if !vars.contains_key(name) {
            return Err(PipelineError::Template(format!("{kind}.{name}")));
        }
    }

    let tpl = kind.template();
    let mut out = String::with_capacity(tpl.len() + vars.values().map(|v| v.len()).sum::<usize>());
    let mut rest = tpl;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if vars.contains_key(&after[..close]) => {
                out.push_str(vars[&after[..close]]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

pub fn join_answers<'a>(answers: impl IntoIterator<Item = &'a str>) -> String {
    answers.into_iter().collect::<Vec<_>>().join("\n")
}

/// Summary block fed to consolidation: one `# SUMMARY n:` section per
/// successful batch, in batch order.
pub fn format_theme_summaries(batches: &[Vec<Theme>]) -> String {
    let mut collection = String::new();
    for (run, themes) in batches.iter().enumerate() {
        collection.push_str(&format!("# SUMMARY {}:\n", run + 1));
        for theme in themes {
            collection.push_str(&format!(
                "<theme_name>{}</theme_name>\n\
                 <theme_description>{}</theme_description>\n\
                 <information>Sentiment: {}\nFrequency: {}/5\nUrgency: {}/5</information>\n\
                 ---\n",
                theme.name,
                theme.description,
                theme.sentiment,
                theme.frequency.get(),
                theme.urgency.get(),
            ));
        }
    }
    collection
}

/// `name : description` lines for every theme an answer may be tagged with.
pub fn format_theme_options(themes: &ThemeSet) -> String {
    themes
        .offered()
        .map(|t| format!("{} : {}\n", t.name, t.description))
        .collect()
}

pub fn discovery_schema(language: &str) -> OutputSchema {
    OutputSchema::new(
        DISCOVERY_FUNCTION,
        "To identify the main themes present in the survey answers, based on the survey \
         description and the question that has been asked to the respondent. Close attention \
         must be paid to the frequency and urgency of the responses.",
    )
    .list("major_themes", "List of distinct main themes in the survey responses.")
    .field(
        "theme_name",
        &format!("A descriptive name for the identified theme in {language}"),
        FieldKind::Text,
    )
    .field(
        "theme_description",
        &format!(
            "A longer description in {language} that captures the overall opinion and variance \
             of the identified theme."
        ),
        FieldKind::Text,
    )
    .field(
        "sentiment",
        "What the overall sentiment is in the responses about the specified theme.",
        FieldKind::TextEnum(ThemeSentiment::iter().map(|s| s.to_string()).collect()),
    )
    .field(
        "frequency",
        "A scale from 1-5 defining the overall frequency of this theme. 5 indicates a very high \
         frequency among respondents.",
        scale_kind(),
    )
    .field(
        "urgency",
        "A scale from 1-5 defining the overall urgency of this theme. 5 indicates a very high \
         urgency among respondents.",
        scale_kind(),
    )
}

/// Tagging schema restricted to the offered themes, or `None` when the set
/// offers nothing beyond `General`.
pub fn tagging_schema(themes: &ThemeSet) -> Option<OutputSchema> {
    let names: Vec<String> = themes.offered().map(|t| t.name.clone()).collect();
    if names.is_empty() {
        return None;
    }
    Some(
        OutputSchema::new(
            TAGGING_FUNCTION,
            "To identify the relevant themes present in the survey answer based on the survey \
             description, the question asked to the respondent, and the themes included in the \
             survey. Also assesses the sentiment and urgency expressed for each identified theme.",
        )
        .list("themes", "List of relevant themes identified in the survey response.")
        .field(
            "theme",
            "The identified theme present in the survey answer.",
            FieldKind::TextEnum(names),
        )
        .field(
            "sentiment",
            "The overall sentiment expressed in the response about the specified theme.",
            FieldKind::TextEnum(AnswerSentiment::iter().map(|s| s.to_string()).collect()),
        )
        .field(
            "urgency",
            "A scale from 1-5 defining the urgency of this theme in the response. A higher \
             number indicates a stronger sense of urgency expressed by the respondent.",
            scale_kind(),
        ),
    )
}
