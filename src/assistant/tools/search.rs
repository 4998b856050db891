// SPDX-License-Identifier: MIT

//! `search_cells`: case-insensitive text search across all sheets.

use crate::flow::tool::{Tool, ToolResult};
use crate::sheets::source::Workbook;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

static SEARCH_CELLS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Text to look for in cell contents"
            }
        },
        "required": ["query"]
    })
});

#[derive(Debug, Deserialize)]
struct SearchCellsArgs {
    query: String,
}

pub struct SearchCellsTool {
    workbook: Arc<dyn Workbook>,
}

impl SearchCellsTool {
    pub fn new(workbook: Arc<dyn Workbook>) -> Self {
        Self { workbook }
    }
}

#[async_trait]
impl Tool for SearchCellsTool {
    fn name(&self) -> &str {
        "search_cells"
    }

    fn description(&self) -> &str {
        "Finds cells whose text contains the query, across all sheets."
    }

    fn schema(&self) -> &Value {
        &SEARCH_CELLS_SCHEMA
    }

    async fn call(&self, args: Value) -> ToolResult {
        let args: SearchCellsArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(_) => return ToolResult::fail("query is required"),
        };
        let query = args.query.trim();
        if query.is_empty() {
            return ToolResult::fail("query is required");
        }

        match self.workbook.find_cells(query).await {
            Ok(matches) => ToolResult::ok(json!({
                "query": query,
                "count": matches.len(),
                "matches": matches,
            })),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}
