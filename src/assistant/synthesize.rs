// SPDX-License-Identifier: MIT

//! Deterministic rendering of accumulated tool results into one assistant
//! message.
//!
//! This node calls no tools and cannot fail: every tool result produces
//! exactly one visible line, failures included, and a result with no
//! registered formatter degrades to a generic line.

use crate::assistant::nodes::names;
use crate::flow::graph::Node;
use crate::flow::state::{Message, MessageKind, StateDelta, StepDraft, WorkflowState};
use crate::flow::tool::ToolResult;
use async_trait::async_trait;

pub struct SynthesizeResponse;

fn format_success(tool: &str, result: &ToolResult) -> String {
    match tool {
        "find_financial_metric" => {
            let metric = result.payload_str("metric").unwrap_or(tool);
            let value = result.payload_str("value").unwrap_or("?");
            let location = result.payload_str("location").unwrap_or("?");
            let mut line = format!("{}: {} at {}", metric, value, location);
            if let Some(sheet) = result.payload_str("sheet") {
                line.push_str(&format!(" on '{}'", sheet));
            }
            if let Some(period) = result.payload_str("period") {
                line.push_str(&format!(" ({})", period));
            }
            line
        }
        "format_cells" => {
            let address = result.payload_str("address").unwrap_or("?");
            format!("Applied formatting to {}", address)
        }
        "search_cells" => {
            let count = result
                .payload
                .as_ref()
                .and_then(|p| p.get("count"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0);
            let query = result.payload_str("query").unwrap_or("?");
            let mut line = format!("Found {} cell(s) matching '{}'", count, query);
            if let Some(matches) = result
                .payload
                .as_ref()
                .and_then(|p| p.get("matches"))
                .and_then(|m| m.as_array())
            {
                let cited: Vec<String> = matches
                    .iter()
                    .take(3)
                    .filter_map(|m| {
                        Some(format!(
                            "{} on '{}'",
                            m.get("address")?.as_str()?,
                            m.get("sheet")?.as_str()?
                        ))
                    })
                    .collect();
                if !cited.is_empty() {
                    line.push_str(&format!(": {}", cited.join(", ")));
                }
            }
            line
        }
        _ => format!("{}: operation completed", tool),
    }
}

fn render(state: &WorkflowState) -> String {
    if state.tool_results.is_empty() {
        return "I didn't run any actions for that request.".to_string();
    }
    state
        .tool_results
        .iter()
        .map(|(tool, result)| {
            if result.success {
                format_success(tool, result)
            } else {
                format!(
                    "❌ {}: {}",
                    tool,
                    result.error.as_deref().unwrap_or("unknown error")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Node for SynthesizeResponse {
    async fn run(&self, state: &WorkflowState) -> StateDelta {
        let content = render(state);
        StateDelta::new()
            .with_message(Message::assistant(&content, MessageKind::FinalResponse))
            .with_step(StepDraft::ok(
                names::SYNTHESIZE_RESPONSE,
                "synthesize",
                format!("{} result line(s)", state.tool_results.len().max(1)),
            ))
    }
}
