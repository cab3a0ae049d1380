//! Chart payload extraction and validation.
//!
//! When the chart intent is active, the completion model is instructed to
//! emit a single JSON object inside a fenced block. This module pulls
//! that object out, validates the required fields (chart kind, title,
//! data), backfills missing labels from values, and re-serializes
//! canonically. Extraction or validation failure means the caller keeps
//! the raw model text unmodified — an answer is never silently dropped.

use serde::{Deserialize, Serialize};

/// Supported chart kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
    Table,
    Stats,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Pie => "pie",
            ChartKind::Line => "line",
            ChartKind::Table => "table",
            ChartKind::Stats => "stats",
        }
    }
}

/// One dataset within a chart payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    #[serde(
        default,
        rename = "backgroundColor",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub background_color: Vec<String>,
}

/// Labels/values/datasets carried by a chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<ChartDataset>,
}

/// Structured chart output handed back to the UI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub data: ChartData,
}

/// Extract and validate a [`ChartSpec`] from model output.
///
/// Looks for the first JSON object between fence markers, falling back to
/// the first balanced `{...}` in the text. Returns `None` when no object
/// is found, required fields are missing, or the chart kind is unknown.
pub fn extract_chart(text: &str) -> Option<ChartSpec> {
    let candidate = fenced_block(text).or_else(|| balanced_object(text))?;
    let mut spec: ChartSpec = serde_json::from_str(candidate).ok()?;
    if spec.title.trim().is_empty() {
        return None;
    }
    backfill_labels(&mut spec.data);
    Some(spec)
}

/// Canonical serialized form of a chart payload.
pub fn canonical_json(spec: &ChartSpec) -> String {
    // ChartSpec always serializes cleanly; fall back to an empty object
    // defensively rather than panicking inside answer formatting.
    serde_json::to_string(spec).unwrap_or_else(|_| "{}".to_string())
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an optional language tag on the fence line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn backfill_labels(data: &mut ChartData) {
    if data.labels.len() < data.values.len() {
        let existing = data.labels.len();
        for i in existing..data.values.len() {
            data.labels.push(format!("Item {}", i + 1));
        }
    }
}
