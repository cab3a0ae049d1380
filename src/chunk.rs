//! Content chunking.
//!
//! Splits ingested content into retrieval units. Structured records become
//! one chunk each, rendered as a key:value block with stable key ordering
//! so repeated ingestion of identical data yields byte-identical chunks.
//! Raw text is split on paragraph boundaries and accumulated up to a
//! target size without splitting a paragraph.

use crate::models::{Record, ScrapedContent};

/// Chunk normalized content. Empty input yields an empty sequence, which
/// callers treat as "nothing to ingest", not an error.
pub fn chunk_content(content: &ScrapedContent, target_size: usize) -> Vec<String> {
    match content {
        ScrapedContent::Records(records) => chunk_records(records),
        ScrapedContent::Text(text) => chunk_text(text, target_size),
    }
}

/// Render one chunk per record as a deterministic key:value block.
///
/// Keys come out in sorted order (records are `BTreeMap`s), and value
/// rendering is canonical, so identical records always produce identical
/// chunk text.
pub fn chunk_records(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| {
            if record.is_empty() {
                return None;
            }
            let block = record
                .iter()
                .map(|(key, value)| format!("{}: {}", key, render_value(value)))
                .collect::<Vec<_>>()
                .join("\n");
            Some(block)
        })
        .collect()
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        // Nested shapes keep compact canonical JSON
        other => other.to_string(),
    }
}

/// Split raw text on paragraph boundaries, accumulating paragraphs into
/// chunks up to `target_size` characters. A single paragraph longer than
/// the target becomes its own chunk, unsplit.
pub fn chunk_text(text: &str, target_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.len() > target_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(trimmed.to_string());
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };

        if would_be > target_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(trimmed);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_records_one_chunk_each() {
        let records = vec![
            record(&[("country", json!("Peru")), ("capital", json!("Lima"))]),
            record(&[("country", json!("Chile")), ("capital", json!("Santiago"))]),
        ];
        let chunks = chunk_records(&records);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "capital: Lima\ncountry: Peru");
    }

    #[test]
    fn test_records_stable_key_order() {
        // Same data, different insertion order: byte-identical chunk
        let a = record(&[("b", json!(2)), ("a", json!(1))]);
        let b = record(&[("a", json!(1)), ("b", json!(2))]);
        assert_eq!(chunk_records(&[a]), chunk_records(&[b]));
    }

    #[test]
    fn test_records_empty_skipped() {
        let chunks = chunk_records(&[Record::new()]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_text_empty_yields_no_chunks() {
        assert!(chunk_text("", 1000).is_empty());
        assert!(chunk_text("\n\n  \n\n", 1000).is_empty());
    }

    #[test]
    fn test_text_accumulates_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 1000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First paragraph."));
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn test_text_respects_target_size() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // Multi-paragraph chunks never exceed the target
            assert!(chunk.len() <= 30 || !chunk.contains("\n\n"));
        }
    }

    #[test]
    fn test_oversized_paragraph_stays_whole() {
        let long_para = "x".repeat(100);
        let text = format!("short\n\n{}\n\nshort again", long_para);
        let chunks = chunk_text(&text, 50);
        assert!(chunks.iter().any(|c| c == &long_para));
    }

    #[test]
    fn test_text_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(chunk_text(text, 12), chunk_text(text, 12));
    }

    #[test]
    fn test_content_dispatch() {
        let records = ScrapedContent::Records(vec![record(&[("k", json!("v"))])]);
        assert_eq!(chunk_content(&records, 1000), vec!["k: v".to_string()]);
        let text = ScrapedContent::Text("hello".to_string());
        assert_eq!(chunk_content(&text, 1000), vec!["hello".to_string()]);
    }
}
