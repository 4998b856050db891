// SPDX-License-Identifier: MIT

//! `format_cells`: apply visual formatting to a range.
//!
//! Writes go straight to the workbook; there is no transaction and no
//! rollback, matching how the host applies edits.

use crate::flow::tool::{Tool, ToolResult};
use crate::sheets::source::{CellFormat, Workbook};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

static FORMAT_CELLS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "range": {
                "type": "string",
                "description": "A1-style target, e.g. B2 or A1:C10"
            },
            "sheet": {
                "type": "string",
                "description": "Sheet name; defaults to the first sheet"
            },
            "fillColor": {
                "type": "string",
                "description": "Fill color name, e.g. red, yellow"
            },
            "bold": {
                "type": "boolean"
            },
            "numberFormat": {
                "type": "string",
                "description": "Number format code, e.g. 0.0%"
            }
        },
        "required": ["range"]
    })
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatCellsArgs {
    range: String,
    sheet: Option<String>,
    fill_color: Option<String>,
    bold: Option<bool>,
    number_format: Option<String>,
}

pub struct FormatCellsTool {
    workbook: Arc<dyn Workbook>,
}

impl FormatCellsTool {
    pub fn new(workbook: Arc<dyn Workbook>) -> Self {
        Self { workbook }
    }
}

#[async_trait]
impl Tool for FormatCellsTool {
    fn name(&self) -> &str {
        "format_cells"
    }

    fn description(&self) -> &str {
        "Applies fill color, bold, or a number format to a cell range."
    }

    fn schema(&self) -> &Value {
        &FORMAT_CELLS_SCHEMA
    }

    async fn call(&self, args: Value) -> ToolResult {
        let args: FormatCellsArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(_) => return ToolResult::fail("range is required"),
        };
        if args.fill_color.is_none() && args.bold.is_none() && args.number_format.is_none() {
            return ToolResult::fail("nothing to apply: pass fillColor, bold or numberFormat");
        }

        let format = CellFormat {
            fill_color: args.fill_color.clone(),
            bold: args.bold,
            number_format: args.number_format.clone(),
        };
        match self
            .workbook
            .format_range(args.sheet.as_deref(), &args.range, &format)
            .await
        {
            Ok(address) => ToolResult::ok(json!({
                "address": address,
                "applied": format,
            })),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}
