// SPDX-License-Identifier: MIT

//! The workbook collaborator: the seam between tools and the tabular data
//! source. Real hosts speak to a spreadsheet application here; tests and
//! the CLI use `InMemoryWorkbook` loaded from YAML fixtures.
//!
//! Writes are applied immediately, with no transaction and no rollback;
//! the workbook is treated as read-mostly during a turn.

use crate::flow::error::SheetError;
use crate::sheets::a1::{cell_name, parse_range, RangeRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// The evaluated content of a single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// Visual formatting applied to a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CellFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
}

/// One cell: evaluated value plus the formula that produced it, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    pub formula: Option<String>,
    pub format: Option<CellFormat>,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            ..Default::default()
        }
    }

    pub fn number(value: f64) -> Self {
        Self {
            value: CellValue::Number(value),
            ..Default::default()
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }
}

/// A rectangular read result: values and formulas share dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeData {
    pub values: Vec<Vec<CellValue>>,
    pub formulas: Vec<Vec<Option<String>>>,
    /// Normalized A1 address of the region that was read
    pub address: String,
}

impl RangeData {
    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values.first().map(|r| r.len()).unwrap_or(0)
    }
}

/// A hit from a text search across the workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMatch {
    pub sheet: String,
    pub address: String,
    pub text: String,
}

/// Data-source collaborator consumed only inside tools.
#[async_trait]
pub trait Workbook: Send + Sync {
    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Read a rectangular range. `sheet = None` reads the first sheet.
    async fn read_range(&self, sheet: Option<&str>, range: &str)
        -> Result<RangeData, SheetError>;

    /// Read the used region of a sheet, from A1 to the bottom-right-most
    /// populated cell.
    async fn used_range(&self, sheet: &str) -> Result<RangeData, SheetError>;

    /// Write values into a range. Returns the normalized address written.
    async fn write_range(
        &self,
        sheet: Option<&str>,
        range: &str,
        values: Vec<Vec<CellValue>>,
    ) -> Result<String, SheetError>;

    /// Apply formatting to a range. Returns the normalized address.
    async fn format_range(
        &self,
        sheet: Option<&str>,
        range: &str,
        format: &CellFormat,
    ) -> Result<String, SheetError>;

    /// Case-insensitive substring search over text cells, all sheets.
    async fn find_cells(&self, query: &str) -> Result<Vec<CellMatch>, SheetError>;
}

#[derive(Debug, Default)]
struct SheetData {
    cells: BTreeMap<(usize, usize), Cell>,
}

impl SheetData {
    fn extent(&self) -> (usize, usize) {
        let rows = self.cells.keys().map(|(r, _)| r + 1).max().unwrap_or(0);
        let cols = self.cells.keys().map(|(_, c)| c + 1).max().unwrap_or(0);
        (rows, cols)
    }

    fn slice(&self, range: RangeRef) -> RangeData {
        let mut values = Vec::with_capacity(range.rows());
        let mut formulas = Vec::with_capacity(range.rows());
        for row in range.start_row..=range.end_row {
            let mut value_row = Vec::with_capacity(range.cols());
            let mut formula_row = Vec::with_capacity(range.cols());
            for col in range.start_col..=range.end_col {
                match self.cells.get(&(row, col)) {
                    Some(cell) => {
                        value_row.push(cell.value.clone());
                        formula_row.push(cell.formula.clone());
                    }
                    None => {
                        value_row.push(CellValue::Empty);
                        formula_row.push(None);
                    }
                }
            }
            values.push(value_row);
            formulas.push(formula_row);
        }
        RangeData {
            values,
            formulas,
            address: range.to_a1(),
        }
    }
}

/// BTreeMap-backed workbook for tests and the CLI.
///
/// Sheet order is insertion order, matching the fixture document order.
pub struct InMemoryWorkbook {
    sheets: RwLock<Vec<(String, SheetData)>>,
}

impl Default for InMemoryWorkbook {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkbook {
    pub fn new() -> Self {
        Self {
            sheets: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace a cell, creating the sheet on first touch.
    pub fn insert(&self, sheet: &str, a1: &str, cell: Cell) -> Result<(), SheetError> {
        let range = parse_range(a1)?;
        let mut sheets = self.sheets.write().expect("workbook lock");
        let idx = match sheets.iter().position(|(name, _)| name == sheet) {
            Some(idx) => idx,
            None => {
                sheets.push((sheet.to_string(), SheetData::default()));
                sheets.len() - 1
            }
        };
        sheets[idx]
            .1
            .cells
            .insert((range.start_row, range.start_col), cell);
        Ok(())
    }

    /// Load a workbook fixture:
    ///
    /// ```yaml
    /// Model:
    ///   A10: "Unlevered IRR"
    ///   B10: { value: 0.253, formula: "=XIRR(B2:B8,A2:A8)" }
    ///   C4: 1.6
    /// ```
    pub fn from_yaml(text: &str) -> Result<Self, SheetError> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| SheetError::BadRange(format!("fixture parse error: {e}")))?;
        let mapping = doc
            .as_mapping()
            .ok_or_else(|| SheetError::BadRange("fixture root must be a mapping".to_string()))?;

        let workbook = Self::new();
        for (sheet_key, cells) in mapping {
            let sheet = sheet_key
                .as_str()
                .ok_or_else(|| SheetError::BadRange("sheet names must be strings".to_string()))?;
            let cell_map = cells.as_mapping().ok_or_else(|| {
                SheetError::BadRange(format!("sheet '{sheet}' must map cells to entries"))
            })?;
            for (addr_key, entry) in cell_map {
                let addr = addr_key.as_str().ok_or_else(|| {
                    SheetError::BadRange(format!("cell addresses in '{sheet}' must be strings"))
                })?;
                workbook.insert(sheet, addr, parse_fixture_cell(entry, sheet, addr)?)?;
            }
        }
        Ok(workbook)
    }

    fn resolve_sheet_name(&self, sheet: Option<&str>) -> Result<String, SheetError> {
        let sheets = self.sheets.read().expect("workbook lock");
        match sheet {
            Some(name) => sheets
                .iter()
                .find(|(n, _)| n == name)
                .map(|(n, _)| n.clone())
                .ok_or_else(|| SheetError::UnknownSheet(name.to_string())),
            None => sheets
                .first()
                .map(|(n, _)| n.clone())
                .ok_or_else(|| SheetError::UnknownSheet("<empty workbook>".to_string())),
        }
    }
}

fn parse_fixture_cell(
    entry: &serde_yaml::Value,
    sheet: &str,
    addr: &str,
) -> Result<Cell, SheetError> {
    use serde_yaml::Value;
    let bad = || SheetError::BadRange(format!("unsupported entry at {sheet}!{addr}"));
    match entry {
        Value::String(s) => Ok(Cell::text(s.clone())),
        Value::Number(n) => Ok(Cell::number(n.as_f64().ok_or_else(&bad)?)),
        Value::Bool(b) => Ok(Cell {
            value: CellValue::Bool(*b),
            ..Default::default()
        }),
        Value::Mapping(_) => {
            let value = match entry.get("value") {
                Some(Value::String(s)) => CellValue::Text(s.clone()),
                Some(Value::Number(n)) => CellValue::Number(n.as_f64().ok_or_else(&bad)?),
                Some(Value::Bool(b)) => CellValue::Bool(*b),
                None | Some(Value::Null) => CellValue::Empty,
                _ => return Err(bad()),
            };
            let formula = match entry.get("formula") {
                Some(Value::String(s)) => Some(s.clone()),
                None => None,
                _ => return Err(bad()),
            };
            Ok(Cell {
                value,
                formula,
                format: None,
            })
        }
        _ => Err(bad()),
    }
}

#[async_trait]
impl Workbook for InMemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets
            .read()
            .expect("workbook lock")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn read_range(
        &self,
        sheet: Option<&str>,
        range: &str,
    ) -> Result<RangeData, SheetError> {
        let name = self.resolve_sheet_name(sheet)?;
        let parsed = parse_range(range)?;
        let sheets = self.sheets.read().expect("workbook lock");
        let (_, data) = sheets
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or(SheetError::UnknownSheet(name))?;
        Ok(data.slice(parsed))
    }

    async fn used_range(&self, sheet: &str) -> Result<RangeData, SheetError> {
        let sheets = self.sheets.read().expect("workbook lock");
        let (_, data) = sheets
            .iter()
            .find(|(n, _)| n == sheet)
            .ok_or_else(|| SheetError::UnknownSheet(sheet.to_string()))?;
        let (rows, cols) = data.extent();
        if rows == 0 || cols == 0 {
            return Ok(RangeData {
                values: Vec::new(),
                formulas: Vec::new(),
                address: "A1".to_string(),
            });
        }
        Ok(data.slice(RangeRef {
            start_row: 0,
            start_col: 0,
            end_row: rows - 1,
            end_col: cols - 1,
        }))
    }

    async fn write_range(
        &self,
        sheet: Option<&str>,
        range: &str,
        values: Vec<Vec<CellValue>>,
    ) -> Result<String, SheetError> {
        let name = self.resolve_sheet_name(sheet)?;
        let parsed = parse_range(range)?;
        let mut sheets = self.sheets.write().expect("workbook lock");
        let (_, data) = sheets
            .iter_mut()
            .find(|(n, _)| *n == name)
            .ok_or(SheetError::UnknownSheet(name))?;
        for (i, row) in values.iter().enumerate().take(parsed.rows()) {
            for (j, value) in row.iter().enumerate().take(parsed.cols()) {
                let key = (parsed.start_row + i, parsed.start_col + j);
                let cell = data.cells.entry(key).or_default();
                cell.value = value.clone();
                cell.formula = None;
            }
        }
        Ok(parsed.to_a1())
    }

    async fn format_range(
        &self,
        sheet: Option<&str>,
        range: &str,
        format: &CellFormat,
    ) -> Result<String, SheetError> {
        let name = self.resolve_sheet_name(sheet)?;
        let parsed = parse_range(range)?;
        let mut sheets = self.sheets.write().expect("workbook lock");
        let (_, data) = sheets
            .iter_mut()
            .find(|(n, _)| *n == name)
            .ok_or(SheetError::UnknownSheet(name))?;
        for row in parsed.start_row..=parsed.end_row {
            for col in parsed.start_col..=parsed.end_col {
                let cell = data.cells.entry((row, col)).or_default();
                let existing = cell.format.get_or_insert_with(CellFormat::default);
                if format.fill_color.is_some() {
                    existing.fill_color = format.fill_color.clone();
                }
                if format.bold.is_some() {
                    existing.bold = format.bold;
                }
                if format.number_format.is_some() {
                    existing.number_format = format.number_format.clone();
                }
            }
        }
        Ok(parsed.to_a1())
    }

    async fn find_cells(&self, query: &str) -> Result<Vec<CellMatch>, SheetError> {
        let needle = query.to_lowercase();
        let sheets = self.sheets.read().expect("workbook lock");
        let mut matches = Vec::new();
        for (name, data) in sheets.iter() {
            for ((row, col), cell) in &data.cells {
                if let Some(text) = cell.value.as_text() {
                    if text.to_lowercase().contains(&needle) {
                        matches.push(CellMatch {
                            sheet: name.clone(),
                            address: cell_name(*row, *col),
                            text: text.to_string(),
                        });
                    }
                }
            }
        }
        Ok(matches)
    }
}
