//! Deterministic aggregation shortcut for superlative questions.
//!
//! When a query asks for a most/least style answer, the assembled context
//! is scanned for "entity — numeric attribute" pairs and the max/min is
//! computed directly, skipping the completion API entirely. Numeric
//! superlative answers must be exact, not subject to generative
//! paraphrase error. When no pairs are found the caller falls through to
//! normal synthesis.
//!
//! The recognized patterns are deliberately narrow (`Entity: 123` and
//! `Entity has a <attribute> of 123`); broader numeric aggregation is out
//! of scope.

use std::sync::LazyLock;

use regex::Regex;

/// A directly computed superlative answer.
#[derive(Debug, Clone)]
pub struct AggregateAnswer {
    pub entity: String,
    pub value: f64,
    pub answer: String,
}

static SUPERLATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(most|least|highest|lowest|largest|smallest|biggest|fewest|cheapest|max(?:imum)?|min(?:imum)?)\b",
    )
    .unwrap()
});

static MINIMUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(least|lowest|smallest|fewest|cheapest|min(?:imum)?)\b").unwrap()
});

/// Word following the superlative, used as the attribute in the answer
/// template ("highest population" → "population").
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:most|least|highest|lowest|largest|smallest|biggest|fewest|cheapest|maximum|minimum)\s+([a-z]+)",
    )
    .unwrap()
});

/// `Entity: 123` on its own line. The entity must start uppercase so
/// record-rendered field names (`population: 123`) are not mistaken for
/// entities.
static PAIR_COLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*]\s*)?([A-Z][\w .'&/-]{0,60}?)\s*:\s*\$?([0-9][0-9 ,.]*)\s*$")
        .unwrap()
});

/// `Entity has a <attribute> of 123`.
static PAIR_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][\w .'-]{0,60}?)\s+has\s+(?:a|an)?\s*[a-z]+\s+of\s+\$?([0-9][0-9 ,.]*)")
        .unwrap()
});

/// Does the query ask for a superlative?
pub fn is_superlative(query: &str) -> bool {
    SUPERLATIVE_RE.is_match(&query.to_lowercase())
}

/// Try the aggregation shortcut. Returns `None` when the query is not
/// superlative or the context yields no entity–number pairs, in which
/// case the caller proceeds to normal synthesis.
pub fn try_aggregate(query: &str, context: &str) -> Option<AggregateAnswer> {
    let lower = query.to_lowercase();
    if !SUPERLATIVE_RE.is_match(&lower) {
        return None;
    }

    let pairs = extract_pairs(context);
    if pairs.is_empty() {
        tracing::debug!("superlative query but no entity-number pairs; falling through");
        return None;
    }

    let wants_minimum = MINIMUM_RE.is_match(&lower);
    let chosen = if wants_minimum {
        pairs
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    } else {
        pairs
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }?;

    let direction = if wants_minimum { "lowest" } else { "highest" };
    let attribute = ATTRIBUTE_RE
        .captures(&lower)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "value".to_string());

    let answer = format!(
        "{} has the {} {}: {}.",
        chosen.0,
        direction,
        attribute,
        format_value(chosen.1)
    );

    Some(AggregateAnswer {
        entity: chosen.0.clone(),
        value: chosen.1,
        answer,
    })
}

/// Scan context for entity–number pairs, normalizing thousands
/// separators. First occurrence wins per entity.
pub fn extract_pairs(context: &str) -> Vec<(String, f64)> {
    let mut pairs: Vec<(String, f64)> = Vec::new();

    for re in [&*PAIR_COLON_RE, &*PAIR_OF_RE] {
        for caps in re.captures_iter(context) {
            let entity = caps[1].trim().to_string();
            if let Some(value) = parse_number(&caps[2]) {
                if !pairs.iter().any(|(e, _)| e == &entity) {
                    pairs.push((entity, value));
                }
            }
        }
    }

    pairs
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
