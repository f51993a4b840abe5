use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::detector::ReturnKind;
use crate::runner::ProbeResult;

pub const DEFAULT_OUTPUT_DIR: &str = "auraenabled_responses";

const REQUEST_BODY_RULE: &str = "----------- REQUEST BODY -----------";
const RETURN_VALUE_RULE: &str = "----------- RETURN VALUE -----------";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

pub fn artifact_file_name(class_name: &str, method_name: &str) -> String {
    format!("res_{class_name}_{method_name}.txt")
}

/// Artifact names handed out during one run. A name already taken (a
/// duplicated method, or `A_b.c` against `A.b_c`) gets a `_2`, `_3`, ...
/// suffix so no artifact is overwritten.
#[derive(Clone, Debug, Default)]
pub struct ArtifactNames {
    used: HashSet<String>,
}

impl ArtifactNames {
    pub fn claim(&mut self, class_name: &str, method_name: &str) -> String {
        let first = artifact_file_name(class_name, method_name);
        if self.used.insert(first.clone()) {
            return first;
        }
        let mut n = 2u32;
        loop {
            let name = format!("res_{class_name}_{method_name}_{n}.txt");
            if self.used.insert(name.clone()) {
                return name;
            }
            n += 1;
        }
    }
}

/// Per-candidate artifact: the body that was sent, the return value, and a
/// marker line only when sensitive terms were seen.
pub fn render_artifact(request_body: &str, return_value: &str, sensitive: &[String]) -> String {
    let mut out = String::new();
    out.push_str(REQUEST_BODY_RULE);
    out.push('\n');
    out.push_str(request_body);
    out.push_str("\n\n");
    out.push_str(RETURN_VALUE_RULE);
    out.push('\n');
    out.push_str(return_value);
    out.push_str("\n\n");
    if !sensitive.is_empty() {
        out.push_str(&format!(
            "*** SENSITIVE DATA DETECTED: {} ***\n",
            sensitive.join(", ")
        ));
    }
    out
}

pub async fn write_artifact(dir: &Path, file_name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(file_name);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

#[derive(Clone, Debug, Serialize)]
pub struct OutputRecord {
    pub class_name: String,
    pub method_name: String,
    pub status: Option<u16>,
    pub kind: ReturnKind,
    pub sensitive: Vec<String>,
    pub artifact: String,
}

pub fn build_records(results: &[ProbeResult]) -> Vec<OutputRecord> {
    results
        .iter()
        .map(|r| OutputRecord {
            class_name: r.candidate.class_name.clone(),
            method_name: r.candidate.method_name.clone(),
            status: r.status,
            kind: r.return_value.kind(),
            sensitive: r.sensitive.clone(),
            artifact: r.artifact.display().to_string(),
        })
        .collect()
}

pub fn render_text(results: &[ProbeResult]) -> Vec<u8> {
    let mut out = String::new();
    for r in results {
        out.push_str(&r.progress_line());
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(records: &[OutputRecord]) -> Vec<u8> {
    serde_json::to_vec_pretty(records).unwrap_or_else(|_| b"[]\n".to_vec())
}

pub fn render(format: OutputFormat, results: &[ProbeResult]) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(results),
        OutputFormat::Json => render_json(&build_records(results)),
    }
}
