use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::normalize::HEADER_ROW;

pub const CONFIG_FILE: &str = "ingest.json";
pub const DEFAULT_SUBJECT: &str = "English";
pub const DEFAULT_EXAM_DATE: &str = "Exam-4";

/// Ingestion settings. Subject and exam label are fixed per workspace;
/// nothing is inferred from the uploaded workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestConfig {
    /// 0-based index of the header row; data starts on the row after it.
    pub header_row: usize,
    pub default_subject: String,
    pub default_exam_date: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            header_row: HEADER_ROW,
            default_subject: DEFAULT_SUBJECT.to_string(),
            default_exam_date: DEFAULT_EXAM_DATE.to_string(),
        }
    }
}

/// Reads `<workspace>/ingest.json` if present.
pub fn load_workspace_config(workspace: &Path) -> anyhow::Result<Option<IngestConfig>> {
    let path = workspace.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let cfg: IngestConfig = serde_json::from_str(&text)
        .with_context(|| format!("{} is invalid JSON", path.to_string_lossy()))?;
    if cfg.default_subject.trim().is_empty() || cfg.default_exam_date.trim().is_empty() {
        anyhow::bail!("{}: subject and exam date must not be empty", CONFIG_FILE);
    }
    Ok(Some(cfg))
}
