// SPDX-License-Identifier: MIT

//! Multi-strategy metric resolution over an unstructured cell grid.
//!
//! Financial models rarely put a value in a predictable place. Given a
//! metric label ("IRR", "MOIC", "Revenue") the resolver scans every sheet
//! for label occurrences, tries a fixed ladder of placement strategies
//! around each occurrence, filters candidates through the metric's validity
//! range, and arbitrates the survivors into one answer with a cited
//! location.

use crate::flow::error::SheetError;
use crate::flow::tool::{Tool, ToolResult};
use crate::sheets::a1::cell_name;
use crate::sheets::numeric::{looks_like_period, parse_numeric};
use crate::sheets::source::{CellValue, RangeData, Workbook};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How far each placement strategy is willing to look.
const RIGHT_SCAN_CELLS: usize = 5;
const BELOW_SCAN_CELLS: usize = 3;
const PERIOD_SCAN_COLS: usize = 10;

/// How long a resolved metric stays fresh before the grid is re-scanned.
const CACHE_TTL: Duration = Duration::from_secs(30);

/// Validity predicate applied before a candidate may be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Fractional rate: −100%..1000%
    Irr,
    /// Multiple on invested capital: positive, at most 20x
    Moic,
    /// Anything non-zero
    NonZero,
}

impl Validity {
    pub fn accepts(&self, value: f64) -> bool {
        match self {
            Validity::Irr => (-1.0..=10.0).contains(&value),
            Validity::Moic => value > 0.0 && value <= 20.0,
            Validity::NonZero => value != 0.0,
        }
    }
}

/// How a resolved value is rendered for citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Percent,
    Multiple,
    Plain,
}

struct MetricDef {
    canonical: &'static str,
    terms: &'static [&'static str],
    validity: Validity,
    unit: Unit,
}

/// Known metrics and the label spellings models use for them.
static METRICS: &[MetricDef] = &[
    MetricDef {
        canonical: "IRR",
        terms: &["irr", "internal rate of return"],
        validity: Validity::Irr,
        unit: Unit::Percent,
    },
    MetricDef {
        canonical: "MOIC",
        terms: &["moic", "multiple on invested capital", "money multiple"],
        validity: Validity::Moic,
        unit: Unit::Multiple,
    },
    MetricDef {
        canonical: "NPV",
        terms: &["npv", "net present value"],
        validity: Validity::NonZero,
        unit: Unit::Plain,
    },
    MetricDef {
        canonical: "Revenue",
        terms: &["revenue", "total revenue", "sales"],
        validity: Validity::NonZero,
        unit: Unit::Plain,
    },
    MetricDef {
        canonical: "EBITDA",
        terms: &["ebitda"],
        validity: Validity::NonZero,
        unit: Unit::Plain,
    },
    MetricDef {
        canonical: "Exit Value",
        terms: &["exit value", "exit proceeds"],
        validity: Validity::NonZero,
        unit: Unit::Plain,
    },
    MetricDef {
        canonical: "Cash Flow",
        terms: &["free cash flow", "cash flow", "fcf"],
        validity: Validity::NonZero,
        unit: Unit::Plain,
    },
    MetricDef {
        canonical: "Total Investment",
        terms: &["total investment", "invested capital"],
        validity: Validity::NonZero,
        unit: Unit::Plain,
    },
];

/// Terms the intent classifier can use to spot metric mentions.
pub fn known_metric_terms() -> impl Iterator<Item = (&'static str, &'static str)> {
    METRICS
        .iter()
        .flat_map(|def| def.terms.iter().map(|t| (def.canonical, *t)))
}

fn lookup_metric(name: &str) -> Option<&'static MetricDef> {
    let needle = name.trim().to_lowercase();
    METRICS.iter().find(|def| {
        def.canonical.to_lowercase() == needle || def.terms.iter().any(|t| *t == needle)
    })
}

/// Placement strategy that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RightAdjacent,
    Below,
    InlineColon,
    GridWithPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
}

/// A provisional (location, value, strategy) tuple awaiting arbitration.
/// Only constructed for values that passed the metric's validity check.
#[derive(Debug, Clone, PartialEq)]
struct MetricCandidate {
    sheet: String,
    row: usize,
    col: usize,
    value: f64,
    raw: String,
    strategy: Strategy,
    has_formula: bool,
    tier: ConfidenceTier,
    period: Option<String>,
}

/// The arbitration winner, shaped for the tool payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMetric {
    pub metric: String,
    /// Rendered for citation ("25.3%", "3.2x", "1,250")
    pub value: String,
    pub raw_value: f64,
    /// A1 address of the winning cell
    pub location: String,
    pub sheet: String,
    pub strategy: Strategy,
    pub has_formula: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

struct CacheEntry {
    at: Instant,
    resolved: ResolvedMetric,
}

/// Resolver over a workbook, with a short freshness window per metric so
/// rapid repeated queries do not re-scan the full grid.
pub struct MetricResolver {
    workbook: Arc<dyn Workbook>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MetricResolver {
    pub fn new(workbook: Arc<dyn Workbook>) -> Self {
        Self {
            workbook,
            cache: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    #[cfg(test)]
    fn with_ttl(workbook: Arc<dyn Workbook>, ttl: Duration) -> Self {
        Self {
            workbook,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Resolve a metric by name or label. `Ok(None)` means the label was
    /// not found anywhere (or no candidate survived validity checks).
    pub async fn resolve(&self, name: &str) -> Result<Option<ResolvedMetric>, SheetError> {
        let (canonical, terms, validity, unit) = match lookup_metric(name) {
            Some(def) => (
                def.canonical.to_string(),
                def.terms.to_vec(),
                def.validity,
                def.unit,
            ),
            // Unknown labels are still searchable, with the default range check
            None => (
                name.trim().to_string(),
                vec![],
                Validity::NonZero,
                Unit::Plain,
            ),
        };
        let cache_key = canonical.to_lowercase();

        if let Some(hit) = self.cache_lookup(&cache_key) {
            log::debug!("Metric '{}' served from cache", canonical);
            return Ok(Some(hit));
        }

        let owned_term = name.trim().to_lowercase();
        let terms: Vec<&str> = if terms.is_empty() {
            vec![owned_term.as_str()]
        } else {
            terms
        };

        let candidates = self.scan(&terms, validity).await?;
        log::debug!(
            "Metric '{}': {} candidate(s) across {} sheet(s)",
            canonical,
            candidates.len(),
            self.workbook.sheet_names().len()
        );

        let winner = match arbitrate(candidates) {
            Some(winner) => winner,
            None => return Ok(None),
        };

        let resolved = ResolvedMetric {
            metric: canonical,
            value: format_value(unit, winner.value),
            raw_value: winner.value,
            location: cell_name(winner.row, winner.col),
            sheet: winner.sheet,
            strategy: winner.strategy,
            has_formula: winner.has_formula,
            period: winner.period,
        };
        self.cache_store(cache_key, resolved.clone());
        Ok(Some(resolved))
    }

    /// Canonical names of every known metric whose label occurs somewhere
    /// in the workbook. Used for the "not found" payload.
    pub async fn available_metrics(&self) -> Result<Vec<String>, SheetError> {
        let mut available = Vec::new();
        let mut grids = Vec::new();
        for sheet in self.workbook.sheet_names() {
            grids.push(self.workbook.used_range(&sheet).await?);
        }
        for def in METRICS {
            let found = grids.iter().any(|grid| {
                grid.values.iter().flatten().any(|cell| {
                    cell.as_text()
                        .map(|text| match_label(text, def.terms).is_some())
                        .unwrap_or(false)
                })
            });
            if found {
                available.push(def.canonical.to_string());
            }
        }
        Ok(available)
    }

    fn cache_lookup(&self, key: &str) -> Option<ResolvedMetric> {
        let cache = self.cache.lock().expect("resolver cache lock");
        let entry = cache.get(key)?;
        if entry.at.elapsed() < self.ttl {
            Some(entry.resolved.clone())
        } else {
            None
        }
    }

    fn cache_store(&self, key: String, resolved: ResolvedMetric) {
        let mut cache = self.cache.lock().expect("resolver cache lock");
        cache.insert(
            key,
            CacheEntry {
                at: Instant::now(),
                resolved,
            },
        );
    }

    /// Scan all sheets in workbook order, rows top-down, columns
    /// left-to-right. The resulting candidate order is the tie-break order.
    async fn scan(
        &self,
        terms: &[&str],
        validity: Validity,
    ) -> Result<Vec<MetricCandidate>, SheetError> {
        let mut candidates = Vec::new();
        for sheet in self.workbook.sheet_names() {
            let grid = self.workbook.used_range(&sheet).await?;
            for row in 0..grid.rows() {
                for col in 0..grid.cols() {
                    let Some(text) = grid.values[row][col].as_text() else {
                        continue;
                    };
                    let Some(tier) = match_label(text, terms) else {
                        continue;
                    };
                    if let Some(candidate) =
                        probe_occurrence(&sheet, &grid, row, col, tier, validity)
                    {
                        candidates.push(candidate);
                    }
                }
            }
        }
        Ok(candidates)
    }
}

/// Case-insensitive label match: exact (ignoring a trailing colon) is high
/// confidence, substring is medium.
fn match_label(cell_text: &str, terms: &[&str]) -> Option<ConfidenceTier> {
    let text = cell_text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    for term in terms {
        if text == *term || text.trim_end_matches(':').trim_end() == *term {
            return Some(ConfidenceTier::High);
        }
    }
    for term in terms {
        if text.contains(term) {
            return Some(ConfidenceTier::Medium);
        }
    }
    None
}

/// Try the placement strategies in fixed priority order for one label
/// occurrence; the first that yields a valid value wins for this
/// occurrence.
fn probe_occurrence(
    sheet: &str,
    grid: &RangeData,
    row: usize,
    col: usize,
    tier: ConfidenceTier,
    validity: Validity,
) -> Option<MetricCandidate> {
    let make = |r: usize, c: usize, value: f64, raw: String, has_formula: bool, strategy, period| {
        MetricCandidate {
            sheet: sheet.to_string(),
            row: r,
            col: c,
            value,
            raw,
            strategy,
            has_formula,
            tier,
            period,
        }
    };

    // 1. right_adjacent: up to 5 cells right in the same row
    for dc in 1..=RIGHT_SCAN_CELLS {
        if let Some((value, raw, has_formula)) = numeric_at(grid, row, col + dc, validity) {
            return Some(make(row, col + dc, value, raw, has_formula, Strategy::RightAdjacent, None));
        }
    }

    // 2. below: up to 3 cells down in the same column
    for dr in 1..=BELOW_SCAN_CELLS {
        if let Some((value, raw, has_formula)) = numeric_at(grid, row + dr, col, validity) {
            return Some(make(row + dr, col, value, raw, has_formula, Strategy::Below, None));
        }
    }

    // 3. inline_colon: "IRR: 25.3%" in the label cell itself
    if let Some(text) = grid.values[row][col].as_text() {
        if let Some((_, rhs)) = text.split_once(':') {
            if let Some(value) = parse_numeric(rhs).filter(|v| validity.accepts(*v)) {
                let has_formula = formula_at(grid, row, col);
                return Some(make(row, col, value, rhs.trim().to_string(), has_formula, Strategy::InlineColon, None));
            }
        }
    }

    // 4. grid_with_period: a period header in the row above picks the column
    if row > 0 {
        for c in (col + 1)..=(col + PERIOD_SCAN_COLS) {
            if c >= grid.cols() {
                break;
            }
            let header = &grid.values[row - 1][c];
            let header_text = header.display();
            if header_text.is_empty() || !looks_like_period(&header_text) {
                continue;
            }
            if let Some((value, raw, has_formula)) = numeric_at(grid, row, c, validity) {
                return Some(make(
                    row,
                    c,
                    value,
                    raw,
                    has_formula,
                    Strategy::GridWithPeriod,
                    Some(header_text),
                ));
            }
        }
    }

    None
}

/// Numeric content of a cell, if it passes the validity range.
///
/// An evaluated number is used as-is; display text goes through
/// normalization. Text that still carries its formula ("=C4/C3") is never
/// a value.
fn numeric_at(
    grid: &RangeData,
    row: usize,
    col: usize,
    validity: Validity,
) -> Option<(f64, String, bool)> {
    if row >= grid.rows() || col >= grid.cols() {
        return None;
    }
    let has_formula = formula_at(grid, row, col);
    let (value, raw) = match &grid.values[row][col] {
        CellValue::Number(n) => (*n, n.to_string()),
        CellValue::Text(s) => (parse_numeric(s)?, s.clone()),
        _ => return None,
    };
    validity.accepts(value).then_some((value, raw, has_formula))
}

fn formula_at(grid: &RangeData, row: usize, col: usize) -> bool {
    grid.formulas
        .get(row)
        .and_then(|r| r.get(col))
        .map(|f| f.is_some())
        .unwrap_or(false)
}

/// Pick one winner from the surviving candidates.
///
/// Rules applied in order: high tier over medium, formula-backed over
/// hard-coded literal, grid_with_period over the other strategies. Ties
/// keep the first-found candidate, so the result is stable in scan order.
fn arbitrate(mut candidates: Vec<MetricCandidate>) -> Option<MetricCandidate> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.iter().any(|c| c.tier == ConfidenceTier::High) {
        candidates.retain(|c| c.tier == ConfidenceTier::High);
    }
    if candidates.iter().any(|c| c.has_formula) {
        candidates.retain(|c| c.has_formula);
    }
    if candidates.iter().any(|c| c.strategy == Strategy::GridWithPeriod) {
        candidates.retain(|c| c.strategy == Strategy::GridWithPeriod);
    }
    candidates.into_iter().next()
}

fn format_value(unit: Unit, value: f64) -> String {
    match unit {
        Unit::Percent => format!("{:.1}%", value * 100.0),
        Unit::Multiple => format!("{}x", trim_decimal(value)),
        Unit::Plain => {
            if value.abs() >= 1000.0 {
                group_thousands(value)
            } else {
                trim_decimal(value)
            }
        }
    }
}

fn trim_decimal(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn group_thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

// --- Tool wrapper ---

static FIND_METRIC_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "metricName": {
                "type": "string",
                "description": "Metric label to locate, e.g. IRR, MOIC, Revenue"
            }
        },
        "required": ["metricName"]
    })
});

#[derive(Debug, Deserialize)]
struct FindMetricArgs {
    #[serde(rename = "metricName")]
    metric_name: String,
}

/// `find_financial_metric`: locate a named financial value in the workbook.
pub struct FindFinancialMetricTool {
    resolver: MetricResolver,
}

impl FindFinancialMetricTool {
    pub fn new(workbook: Arc<dyn Workbook>) -> Self {
        Self {
            resolver: MetricResolver::new(workbook),
        }
    }
}

#[async_trait]
impl Tool for FindFinancialMetricTool {
    fn name(&self) -> &str {
        "find_financial_metric"
    }

    fn description(&self) -> &str {
        "Locates a named financial metric (IRR, MOIC, Revenue, ...) in the workbook and returns its value and cell location."
    }

    fn schema(&self) -> &Value {
        &FIND_METRIC_SCHEMA
    }

    async fn call(&self, args: Value) -> ToolResult {
        let args: FindMetricArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(_) => return ToolResult::fail("metricName is required"),
        };
        if args.metric_name.trim().is_empty() {
            return ToolResult::fail("metricName is required");
        }

        match self.resolver.resolve(&args.metric_name).await {
            Ok(Some(resolved)) => match serde_json::to_value(&resolved) {
                Ok(payload) => ToolResult::ok(payload),
                Err(e) => ToolResult::fail(format!("payload serialization failed: {e}")),
            },
            Ok(None) => {
                let available = self
                    .resolver
                    .available_metrics()
                    .await
                    .unwrap_or_default();
                ToolResult::fail_with("not found", json!({ "availableMetrics": available }))
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::source::{Cell, InMemoryWorkbook};

    fn wb() -> Arc<InMemoryWorkbook> {
        Arc::new(InMemoryWorkbook::new())
    }

    async fn resolve(workbook: Arc<InMemoryWorkbook>, name: &str) -> Option<ResolvedMetric> {
        MetricResolver::new(workbook).resolve(name).await.unwrap()
    }

    #[tokio::test]
    async fn test_right_adjacent_strategy() {
        let workbook = wb();
        workbook.insert("Model", "A10", Cell::text("Unlevered IRR")).unwrap();
        workbook
            .insert("Model", "B10", Cell::number(0.253).with_formula("=XIRR(B2:B8)"))
            .unwrap();

        let resolved = resolve(workbook, "IRR").await.unwrap();
        assert_eq!(resolved.location, "B10");
        assert_eq!(resolved.value, "25.3%");
        assert_eq!(resolved.strategy, Strategy::RightAdjacent);
        assert!(resolved.has_formula);
    }

    #[tokio::test]
    async fn test_right_adjacent_skips_gap_cells() {
        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("MOIC")).unwrap();
        // B1 empty, C1 has the value 4 cells would be too far for below, fine for right scan
        workbook.insert("Model", "D1", Cell::number(3.2)).unwrap();

        let resolved = resolve(workbook, "MOIC").await.unwrap();
        assert_eq!(resolved.location, "D1");
        assert_eq!(resolved.strategy, Strategy::RightAdjacent);
    }

    #[tokio::test]
    async fn test_below_strategy() {
        let workbook = wb();
        workbook.insert("Model", "B2", Cell::text("EBITDA")).unwrap();
        workbook.insert("Model", "B4", Cell::number(1500.0)).unwrap();

        let resolved = resolve(workbook, "EBITDA").await.unwrap();
        assert_eq!(resolved.location, "B4");
        assert_eq!(resolved.strategy, Strategy::Below);
        assert_eq!(resolved.value, "1,500");
    }

    #[tokio::test]
    async fn test_inline_colon_strategy() {
        let workbook = wb();
        workbook
            .insert("Model", "A1", Cell::text("IRR: 25.3%"))
            .unwrap();

        let resolved = resolve(workbook, "IRR").await.unwrap();
        assert_eq!(resolved.location, "A1");
        assert_eq!(resolved.raw_value, 0.253);
        assert_eq!(resolved.strategy, Strategy::InlineColon);
    }

    #[tokio::test]
    async fn test_grid_with_period_strategy() {
        // Value sits beyond the 5-cell right-scan window, under a period
        // header in the row above; only the grid strategy can reach it.
        let workbook = wb();
        workbook.insert("Model", "H1", Cell::text("FY24")).unwrap();
        workbook.insert("Model", "A2", Cell::text("Revenue")).unwrap();
        workbook
            .insert("Model", "H2", Cell::text("$1,250"))
            .unwrap();

        let resolved = resolve(workbook, "Revenue").await.unwrap();
        assert_eq!(resolved.strategy, Strategy::GridWithPeriod);
        assert_eq!(resolved.location, "H2");
        assert_eq!(resolved.period.as_deref(), Some("FY24"));
        assert_eq!(resolved.raw_value, 1250.0);
    }

    #[tokio::test]
    async fn test_irr_validity_bounds_reject_out_of_range() {
        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("IRR")).unwrap();
        // 1500% as a fraction is 15.0, outside [-1, 10]
        workbook.insert("Model", "B1", Cell::number(15.0)).unwrap();
        assert!(resolve(workbook, "IRR").await.is_none());

        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("IRR")).unwrap();
        workbook.insert("Model", "B1", Cell::number(-2.0)).unwrap();
        assert!(resolve(workbook, "IRR").await.is_none());
    }

    #[tokio::test]
    async fn test_moic_validity_bounds() {
        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("MOIC")).unwrap();
        workbook.insert("Model", "B1", Cell::number(25.0)).unwrap();
        assert!(resolve(workbook, "MOIC").await.is_none());

        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("MOIC")).unwrap();
        workbook.insert("Model", "B1", Cell::number(0.0)).unwrap();
        assert!(resolve(workbook, "MOIC").await.is_none());
    }

    #[tokio::test]
    async fn test_validity_skips_to_next_cell_in_scan() {
        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("IRR")).unwrap();
        workbook.insert("Model", "B1", Cell::number(15.0)).unwrap(); // invalid
        workbook.insert("Model", "C1", Cell::number(0.31)).unwrap(); // valid

        let resolved = resolve(workbook, "IRR").await.unwrap();
        assert_eq!(resolved.location, "C1");
        assert_eq!(resolved.value, "31.0%");
    }

    #[tokio::test]
    async fn test_formula_text_never_resolves() {
        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("MOIC")).unwrap();
        workbook.insert("Model", "B1", Cell::text("=C4/C3")).unwrap();
        assert!(resolve(workbook, "MOIC").await.is_none());
    }

    #[tokio::test]
    async fn test_formula_backed_wins_over_literal() {
        // Scenario: label at B5; C5 holds 3.2 via formula, D5 holds plain 3.2.
        let workbook = wb();
        workbook.insert("Model", "B5", Cell::text("MOIC")).unwrap();
        workbook
            .insert("Model", "C5", Cell::number(3.2).with_formula("=C4/C3"))
            .unwrap();
        workbook.insert("Model", "D5", Cell::number(3.2)).unwrap();
        // A second label occurrence pointing at the literal
        workbook.insert("Summary", "A1", Cell::text("MOIC")).unwrap();
        workbook.insert("Summary", "B1", Cell::number(3.2)).unwrap();

        let resolved = resolve(workbook, "MOIC").await.unwrap();
        assert_eq!(resolved.sheet, "Model");
        assert_eq!(resolved.location, "C5");
        assert!(resolved.has_formula);
        assert_eq!(resolved.value, "3.2x");
    }

    #[tokio::test]
    async fn test_high_tier_wins_over_medium() {
        let workbook = wb();
        // Substring match first in scan order
        workbook
            .insert("Model", "A1", Cell::text("Unlevered IRR"))
            .unwrap();
        workbook.insert("Model", "B1", Cell::number(0.4)).unwrap();
        // Exact match later
        workbook.insert("Model", "A5", Cell::text("IRR")).unwrap();
        workbook.insert("Model", "B5", Cell::number(0.25)).unwrap();

        let resolved = resolve(workbook, "IRR").await.unwrap();
        assert_eq!(resolved.location, "B5");
        assert_eq!(resolved.value, "25.0%");
    }

    #[tokio::test]
    async fn test_tie_keeps_first_found() {
        let workbook = wb();
        workbook.insert("Model", "A1", Cell::text("NPV")).unwrap();
        workbook.insert("Model", "B1", Cell::number(500.0)).unwrap();
        workbook.insert("Model", "A9", Cell::text("NPV")).unwrap();
        workbook.insert("Model", "B9", Cell::number(700.0)).unwrap();

        let resolved = resolve(workbook, "NPV").await.unwrap();
        assert_eq!(resolved.location, "B1");
        assert_eq!(resolved.raw_value, 500.0);
    }

    #[tokio::test]
    async fn test_not_found_reports_available_metrics() {
        let workbook = wb();
        workbook.insert("Model", "A10", Cell::text("Unlevered IRR")).unwrap();
        workbook.insert("Model", "B10", Cell::number(0.253)).unwrap();
        workbook.insert("Model", "B5", Cell::text("MOIC")).unwrap();
        workbook.insert("Model", "C5", Cell::number(3.2)).unwrap();

        let tool = FindFinancialMetricTool::new(workbook);
        let result = tool.call(json!({"metricName": "NPV"})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("not found"));
        let available = result.payload.unwrap()["availableMetrics"].clone();
        assert_eq!(available, json!(["IRR", "MOIC"]));
    }

    #[tokio::test]
    async fn test_missing_args_is_validation_failure() {
        let workbook = wb();
        let tool = FindFinancialMetricTool::new(workbook);
        let result = tool.call(json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("metricName is required"));
    }

    #[tokio::test]
    async fn test_cache_avoids_rescans_within_ttl() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingWorkbook {
            inner: Arc<InMemoryWorkbook>,
            scans: AtomicUsize,
        }

        #[async_trait]
        impl Workbook for CountingWorkbook {
            fn sheet_names(&self) -> Vec<String> {
                self.inner.sheet_names()
            }
            async fn read_range(
                &self,
                sheet: Option<&str>,
                range: &str,
            ) -> Result<RangeData, SheetError> {
                self.inner.read_range(sheet, range).await
            }
            async fn used_range(&self, sheet: &str) -> Result<RangeData, SheetError> {
                self.scans.fetch_add(1, Ordering::SeqCst);
                self.inner.used_range(sheet).await
            }
            async fn write_range(
                &self,
                sheet: Option<&str>,
                range: &str,
                values: Vec<Vec<CellValue>>,
            ) -> Result<String, SheetError> {
                self.inner.write_range(sheet, range, values).await
            }
            async fn format_range(
                &self,
                sheet: Option<&str>,
                range: &str,
                format: &crate::sheets::source::CellFormat,
            ) -> Result<String, SheetError> {
                self.inner.format_range(sheet, range, format).await
            }
            async fn find_cells(
                &self,
                query: &str,
            ) -> Result<Vec<crate::sheets::source::CellMatch>, SheetError> {
                self.inner.find_cells(query).await
            }
        }

        let inner = wb();
        inner.insert("Model", "A1", Cell::text("IRR")).unwrap();
        inner.insert("Model", "B1", Cell::number(0.2)).unwrap();
        let counting = Arc::new(CountingWorkbook {
            inner,
            scans: AtomicUsize::new(0),
        });

        let resolver = MetricResolver::with_ttl(counting.clone(), Duration::from_secs(60));
        resolver.resolve("IRR").await.unwrap().unwrap();
        let after_first = counting.scans.load(Ordering::SeqCst);
        resolver.resolve("IRR").await.unwrap().unwrap();
        assert_eq!(counting.scans.load(Ordering::SeqCst), after_first);

        // Expired window forces a rescan
        let resolver = MetricResolver::with_ttl(counting.clone(), Duration::from_secs(0));
        resolver.resolve("IRR").await.unwrap().unwrap();
        resolver.resolve("IRR").await.unwrap().unwrap();
        assert!(counting.scans.load(Ordering::SeqCst) > after_first + 1);
    }

    #[test]
    fn test_validity_ranges() {
        assert!(Validity::Irr.accepts(-1.0));
        assert!(Validity::Irr.accepts(10.0));
        assert!(!Validity::Irr.accepts(10.1));
        assert!(!Validity::Irr.accepts(-1.01));
        assert!(Validity::Moic.accepts(0.1));
        assert!(Validity::Moic.accepts(20.0));
        assert!(!Validity::Moic.accepts(0.0));
        assert!(!Validity::Moic.accepts(20.5));
        assert!(Validity::NonZero.accepts(-5.0));
        assert!(!Validity::NonZero.accepts(0.0));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Unit::Percent, 0.253), "25.3%");
        assert_eq!(format_value(Unit::Multiple, 3.2), "3.2x");
        assert_eq!(format_value(Unit::Multiple, 3.0), "3x");
        assert_eq!(format_value(Unit::Plain, 1250.0), "1,250");
        assert_eq!(format_value(Unit::Plain, -1234567.0), "-1,234,567");
        assert_eq!(format_value(Unit::Plain, 42.5), "42.5");
    }
}
