// SPDX-License-Identifier: MIT

//! Numeric normalization for cell text.
//!
//! Financial models render numbers many ways: "$1,234.5", "(12.3%)",
//! "3.2x", "25.3%". This module turns display text back into an f64.
//! A string that still carries its formula ("=C4/C3") is never a value.

use once_cell::sync::Lazy;
use regex::Regex;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Parse a display string into a number.
///
/// Handles currency symbols, thousands separators, parenthesis-as-negative,
/// a `%` suffix (divides by 100) and a trailing `x` multiple suffix
/// (stripped). Returns `None` for formula text, empty strings and anything
/// that does not survive normalization.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let mut text = raw.trim().to_string();
    if text.is_empty() || text.starts_with('=') {
        return None;
    }

    let negative_parens = text.starts_with('(') && text.ends_with(')');
    if negative_parens {
        text = text[1..text.len() - 1].trim().to_string();
    }

    let percent = text.ends_with('%');
    if percent {
        text.truncate(text.len() - 1);
    }

    // "3.2x" style multiples
    if text.ends_with('x') || text.ends_with('X') {
        text.truncate(text.len() - 1);
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let mut value: f64 = cleaned.parse().ok()?;
    if percent {
        value /= 100.0;
    }
    if negative_parens {
        value = -value;
    }
    Some(value)
}

static PERIOD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Years (2024, 2024E, FY24, FY2024), quarters (Q1, Q3 24, Q3'24),
    // and trailing/next-twelve-month markers
    Regex::new(r"(?i)^\s*(?:fy\s?'?\d{2,4}|q[1-4](?:\s?'?\d{2,4})?|(?:19|20)\d{2}[eap]?|ltm|ntm)\s*$")
        .expect("period pattern compiles")
});

/// Does this cell text look like a year/period column header?
pub fn looks_like_period(text: &str) -> bool {
    PERIOD_PATTERN.is_match(text)
}
