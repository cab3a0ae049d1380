//! Query intent classification.
//!
//! A pure function over the query string. Categories are matched from an
//! explicit ordered rule table so the precedence contract is testable on
//! its own: explicit-format > aggregation > comparison > statistics >
//! summary > list > specific-item > conversational (default).

use std::sync::LazyLock;

use regex::Regex;

use crate::chart::ChartKind;

/// Response-shape category for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentCategory {
    /// Explicit format request: chart, table, json.
    Chart,
    /// Superlative numeric question, eligible for the aggregation shortcut.
    Aggregation,
    Comparison,
    Statistics,
    Summary,
    /// Display / list everything.
    List,
    SpecificItem,
    /// Default when nothing else matches.
    Conversational,
}

/// Classification result with derived flags.
#[derive(Debug, Clone)]
pub struct QueryIntent {
    pub category: IntentCategory,
    /// Requested chart kind, when the query names a format explicitly.
    pub chart_kind: Option<ChartKind>,
    pub wants_price: bool,
    pub wants_list: bool,
}

static CHART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(charts?|graphs?|plot|table|json|visuali[sz]e|pie|bar)\b").unwrap()
});

static AGGREGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(most|least|highest|lowest|largest|smallest|biggest|fewest|cheapest|max(imum)?|min(imum)?|top\s+\d+)\b").unwrap()
});

static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(compare|comparison|versus|vs\.?|difference\s+between|better|worse)\b").unwrap()
});

static STATISTICS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(how\s+many|count|total|number\s+of|average|mean|median|sum|statistics|stats)\b")
        .unwrap()
});

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(summar(y|ize|ise)|overview|tl;?dr|in\s+short|briefly)\b").unwrap()
});

static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(list|show\s+(me\s+)?(all|every)|display|all\s+(of\s+)?the|everything)\b")
        .unwrap()
});

static SPECIFIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(what\s+is|what's|who\s+is|where\s+is|when\s+(is|was|did)|details?\s+(about|of|on)|describe|tell\s+me\s+about)\b")
        .unwrap()
});

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(price|prices|pricing|cost|costs|how\s+much|cheap|expensive)\b").unwrap()
});

/// The ordered rule table. First matching row wins.
static RULES: LazyLock<Vec<(IntentCategory, &'static Regex)>> = LazyLock::new(|| {
    vec![
        (IntentCategory::Chart, &*CHART_RE),
        (IntentCategory::Aggregation, &*AGGREGATION_RE),
        (IntentCategory::Comparison, &*COMPARISON_RE),
        (IntentCategory::Statistics, &*STATISTICS_RE),
        (IntentCategory::Summary, &*SUMMARY_RE),
        (IntentCategory::List, &*LIST_RE),
        (IntentCategory::SpecificItem, &*SPECIFIC_RE),
    ]
});

/// Classify a query into the most specific matching category.
pub fn classify(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();

    let category = RULES
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(cat, _)| *cat)
        .unwrap_or(IntentCategory::Conversational);

    let chart_kind = if category == IntentCategory::Chart {
        Some(detect_chart_kind(&lower))
    } else {
        None
    };

    QueryIntent {
        category,
        chart_kind,
        wants_price: PRICE_RE.is_match(&lower),
        wants_list: LIST_RE.is_match(&lower),
    }
}

fn detect_chart_kind(lower: &str) -> ChartKind {
    if lower.contains("pie") {
        ChartKind::Pie
    } else if lower.contains("line") || lower.contains("trend") || lower.contains("over time") {
        ChartKind::Line
    } else if lower.contains("table") || lower.contains("json") {
        ChartKind::Table
    } else if lower.contains("stats") || lower.contains("statistics") {
        ChartKind::Stats
    } else {
        ChartKind::Bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_format_wins_over_everything() {
        // "table" + "most": explicit format keyword has top priority
        let intent = classify("show the most expensive items as a table");
        assert_eq!(intent.category, IntentCategory::Chart);
        assert_eq!(intent.chart_kind, Some(ChartKind::Table));
    }

    #[test]
    fn test_aggregation_beats_statistics() {
        let intent = classify("which country has the highest total population");
        assert_eq!(intent.category, IntentCategory::Aggregation);
    }

    #[test]
    fn test_comparison() {
        let intent = classify("compare the two plans");
        assert_eq!(intent.category, IntentCategory::Comparison);
    }

    #[test]
    fn test_statistics_how_many() {
        let intent = classify("how many countries are there");
        assert_eq!(intent.category, IntentCategory::Statistics);
    }

    #[test]
    fn test_summary() {
        let intent = classify("give me an overview of the page");
        assert_eq!(intent.category, IntentCategory::Summary);
    }

    #[test]
    fn test_list() {
        let intent = classify("show me all products");
        assert_eq!(intent.category, IntentCategory::List);
        assert!(intent.wants_list);
    }

    #[test]
    fn test_specific_item() {
        let intent = classify("what is the capital of Peru");
        assert_eq!(intent.category, IntentCategory::SpecificItem);
    }

    #[test]
    fn test_conversational_default() {
        let intent = classify("thanks, that helps");
        assert_eq!(intent.category, IntentCategory::Conversational);
    }

    #[test]
    fn test_price_flag() {
        let intent = classify("what is the price of the basic plan");
        assert!(intent.wants_price);
        assert_eq!(intent.category, IntentCategory::SpecificItem);
    }

    #[test]
    fn test_chart_kinds() {
        assert_eq!(
            classify("pie chart of sales").chart_kind,
            Some(ChartKind::Pie)
        );
        assert_eq!(
            classify("plot the trend as a line chart").chart_kind,
            Some(ChartKind::Line)
        );
        assert_eq!(
            classify("give me a chart of revenue").chart_kind,
            Some(ChartKind::Bar)
        );
        assert_eq!(classify("output json").chart_kind, Some(ChartKind::Table));
    }

    #[test]
    fn test_priority_order_is_stable() {
        // Every category keyword present at once: the table order decides
        let q = "chart the most compared counts, summary list of what is there";
        assert_eq!(classify(q).category, IntentCategory::Chart);

        let q = "the most compared counts, summary list of what is there";
        assert_eq!(classify(q).category, IntentCategory::Aggregation);

        let q = "compare counts, summary list of what is there";
        assert_eq!(classify(q).category, IntentCategory::Comparison);

        let q = "count the summary list of what is there";
        assert_eq!(classify(q).category, IntentCategory::Statistics);
    }
}
