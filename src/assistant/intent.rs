// SPDX-License-Identifier: MIT

//! Keyword-based intent classification.
//!
//! This is deliberately simple pattern matching over fixed vocabularies,
//! not NLP: an ordered rule table is evaluated top to bottom and the first
//! match wins. Keeping the rules as data lets tests enumerate them
//! directly.

use crate::flow::state::{Intent, IntentType};
use crate::assistant::tools::metrics::known_metric_terms;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// One classification rule: if any keyword occurs in the (lowercased)
/// message, the rule's intent and base confidence apply.
pub struct IntentRule {
    pub intent_type: IntentType,
    pub confidence: f64,
    pub keywords: &'static [&'static str],
}

/// Evaluated top to bottom; order matters. A formatting request that
/// mentions a metric ("highlight the IRR cell") must stay a formatting
/// request, so formatting outranks calculation.
pub static RULES: &[IntentRule] = &[
    IntentRule {
        intent_type: IntentType::Formatting,
        confidence: 0.85,
        keywords: &[
            "format", "highlight", "color", "colour", "bold", "fill", "shade", "paint",
        ],
    },
    IntentRule {
        intent_type: IntentType::Calculation,
        confidence: 0.85,
        keywords: &[
            "what is", "what's", "calculate", "compute", "how much", "irr", "moic", "npv",
            "revenue", "ebitda", "cash flow", "exit value", "rate of return",
        ],
    },
    IntentRule {
        intent_type: IntentType::Search,
        confidence: 0.8,
        keywords: &["find", "where", "locate", "search", "look up", "show me"],
    },
];

const NO_MATCH_CONFIDENCE: f64 = 0.3;

static COLOR_VOCABULARY: &[&str] = &[
    "red", "green", "blue", "yellow", "orange", "purple", "gray", "grey", "black", "white",
];

static RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Uppercase A1-style cell or range tokens: B2, $C$5, A1:C10
    Regex::new(r"\$?[A-Z]{1,3}\$?\d{1,7}(?::\$?[A-Z]{1,3}\$?\d{1,7})?")
        .expect("range pattern compiles")
});

/// Classify the latest user message.
pub fn classify(message: &str) -> Intent {
    let lowered = message.to_lowercase();
    let entities = extract_entities(message, &lowered);

    for rule in RULES {
        if rule.keywords.iter().any(|k| lowered.contains(k)) {
            return Intent {
                intent_type: rule.intent_type,
                confidence: rule.confidence,
                entities,
            };
        }
    }

    Intent {
        intent_type: IntentType::Unclear,
        confidence: NO_MATCH_CONFIDENCE,
        entities,
    }
}

/// Pull colors, metric names and cell/range tokens out of the message.
/// Only non-empty categories appear in the map.
pub fn extract_entities(original: &str, lowered: &str) -> BTreeMap<String, Vec<String>> {
    let mut entities = BTreeMap::new();

    let colors: Vec<String> = COLOR_VOCABULARY
        .iter()
        .filter(|color| lowered.contains(*color))
        .map(|color| color.to_string())
        .collect();
    if !colors.is_empty() {
        entities.insert("colors".to_string(), colors);
    }

    let mut metrics: Vec<String> = Vec::new();
    for (canonical, term) in known_metric_terms() {
        if lowered.contains(term) && !metrics.iter().any(|m| m == canonical) {
            metrics.push(canonical.to_string());
        }
    }
    if !metrics.is_empty() {
        entities.insert("metrics".to_string(), metrics);
    }

    let ranges: Vec<String> = RANGE_PATTERN
        .find_iter(original)
        .map(|m| m.as_str().replace('$', ""))
        .collect();
    if !ranges.is_empty() {
        entities.insert("ranges".to_string(), ranges);
    }

    entities
}
