//! Output artifacts of a run: the flat tag table as JSON lines, the theme
//! definitions keyed by question, and the failure report.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use shared::dto::{PipelineOutput, TaggedAnswer};

pub const TAGGED_ANSWERS_FILE: &str = "tagged_answers.jsonl";
pub const THEMES_FILE: &str = "themes.json";
pub const FAILURES_FILE: &str = "failures.json";

/// One JSON object per (answer, theme) row, newline terminated.
pub fn tagged_answers_jsonl(table: &[TaggedAnswer]) -> serde_json::Result<String> {
    let mut out = String::new();
    for row in table {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}

pub async fn write_outputs(dir: &Path, output: &PipelineOutput) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let files = [
        (TAGGED_ANSWERS_FILE, tagged_answers_jsonl(&output.table)?),
        (THEMES_FILE, serde_json::to_string_pretty(&output.themes)?),
        (FAILURES_FILE, serde_json::to_string_pretty(&output.failures)?),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, body) in files {
        let path = dir.join(name);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    info!(dir = %dir.display(), rows = output.table.len(), "exports written");
    Ok(written)
}
