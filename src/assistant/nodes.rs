// SPDX-License-Identifier: MIT

//! The assistant's graph nodes.
//!
//! Each node is a `(State) -> StateDelta` step. Nodes own their failure
//! handling: whatever goes wrong is recorded as a failed step or tool
//! result, never raised.

use crate::assistant::intent::classify;
use crate::flow::graph::Node;
use crate::flow::registry::ToolRegistry;
use crate::flow::state::{
    IntentType, Message, MessageKind, StateDelta, StepDraft, WorkflowState,
};
use crate::flow::tool::{ToolResult, ToolSpec};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Node names, used for wiring and for the audit log.
pub mod names {
    pub const ANALYZE_INTENT: &str = "analyze_intent";
    pub const SELECT_TOOLS: &str = "select_tools";
    pub const EXECUTE_TOOLS: &str = "execute_tools";
    pub const REQUEST_CLARIFICATION: &str = "request_clarification";
    pub const SYNTHESIZE_RESPONSE: &str = "synthesize_response";
}

/// Classify the latest user message into an intent.
pub struct AnalyzeIntent;

#[async_trait]
impl Node for AnalyzeIntent {
    async fn run(&self, state: &WorkflowState) -> StateDelta {
        let Some(message) = state.last_user_message() else {
            return StateDelta::new()
                .with_step(StepDraft::failed(
                    names::ANALYZE_INTENT,
                    "classify",
                    "no user message to classify",
                    "empty conversation",
                ))
                .with_intent(classify(""));
        };

        let intent = classify(message);
        log::info!(
            "Intent: {:?} (confidence {:.2})",
            intent.intent_type,
            intent.confidence
        );
        let draft = StepDraft::ok(
            names::ANALYZE_INTENT,
            "classify",
            format!(
                "{:?} (confidence {:.2})",
                intent.intent_type, intent.confidence
            ),
        )
        .with_input(message);
        StateDelta::new().with_intent(intent).with_step(draft)
    }
}

/// Map the classified intent to concrete tool calls.
pub struct SelectTools;

impl SelectTools {
    fn specs_for(state: &WorkflowState) -> Vec<ToolSpec> {
        let Some(intent) = &state.intent else {
            return Vec::new();
        };
        let entities = &intent.entities;
        let message = state.last_user_message().unwrap_or_default();

        match intent.intent_type {
            IntentType::Calculation => {
                let metrics = entities.get("metrics").cloned().unwrap_or_default();
                if metrics.is_empty() {
                    // Nothing named to resolve; fall back to a text search
                    vec![ToolSpec::new("search_cells", json!({ "query": message }))]
                } else {
                    metrics
                        .into_iter()
                        .map(|metric| {
                            ToolSpec::new(
                                "find_financial_metric",
                                json!({ "metricName": metric }),
                            )
                        })
                        .collect()
                }
            }
            IntentType::Formatting => {
                let mut args = serde_json::Map::new();
                if let Some(range) = entities.get("ranges").and_then(|r| r.first()) {
                    args.insert("range".to_string(), json!(range));
                }
                if let Some(color) = entities.get("colors").and_then(|c| c.first()) {
                    args.insert("fillColor".to_string(), json!(color));
                }
                if message.to_lowercase().contains("bold") {
                    args.insert("bold".to_string(), json!(true));
                }
                vec![ToolSpec::new("format_cells", serde_json::Value::Object(args))]
            }
            IntentType::Search => {
                vec![ToolSpec::new("search_cells", json!({ "query": search_query(message, entities) }))]
            }
            IntentType::Unclear => Vec::new(),
        }
    }
}

/// Best search term for a free-text request: prefer a quoted phrase, then
/// a recognized metric, then the raw message.
fn search_query(
    message: &str,
    entities: &std::collections::BTreeMap<String, Vec<String>>,
) -> String {
    if let Some(start) = message.find('"') {
        if let Some(len) = message[start + 1..].find('"') {
            return message[start + 1..start + 1 + len].to_string();
        }
    }
    if let Some(metric) = entities.get("metrics").and_then(|m| m.first()) {
        return metric.clone();
    }
    message.trim().to_string()
}

#[async_trait]
impl Node for SelectTools {
    async fn run(&self, state: &WorkflowState) -> StateDelta {
        let specs = Self::specs_for(state);
        let summary = if specs.is_empty() {
            "no tools selected".to_string()
        } else {
            specs
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        StateDelta::new()
            .with_step(StepDraft::ok(names::SELECT_TOOLS, "select", summary))
            .with_pending_tools(specs)
    }
}

/// Dead-end node for low-confidence turns: ask the user to rephrase.
pub struct RequestClarification;

const CLARIFICATION_TEXT: &str = "I'm not sure what you'd like me to do. \
Here are some things you can ask:\n\
- \"What is our IRR?\"\n\
- \"Highlight A1:B5 in yellow\"\n\
- \"Find cells mentioning revenue\"";

#[async_trait]
impl Node for RequestClarification {
    async fn run(&self, _state: &WorkflowState) -> StateDelta {
        StateDelta::new()
            .with_message(Message::assistant(
                CLARIFICATION_TEXT,
                MessageKind::Clarification,
            ))
            .with_clarification(true)
            .with_step(StepDraft::ok(
                names::REQUEST_CLARIFICATION,
                "clarify",
                "asked user to rephrase",
            ))
    }
}

/// Run every pending tool through the registry.
///
/// Tools are issued as one fan-out batch with a join barrier; each call's
/// success or failure is isolated and recorded independently, so one
/// broken tool never cancels its siblings. Each call is bounded by a
/// wall-clock timeout so a hung tool cannot stall the turn forever.
pub struct ExecuteTools {
    registry: Arc<ToolRegistry>,
    call_timeout: Duration,
}

impl ExecuteTools {
    pub fn new(registry: Arc<ToolRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }
}

#[async_trait]
impl Node for ExecuteTools {
    async fn run(&self, state: &WorkflowState) -> StateDelta {
        let specs = state.pending_tools.clone();
        if specs.is_empty() {
            return StateDelta::new().with_step(StepDraft::ok(
                names::EXECUTE_TOOLS,
                "execute",
                "nothing to execute",
            ));
        }

        let calls = specs.iter().map(|spec| {
            let registry = self.registry.clone();
            let call_timeout = self.call_timeout;
            async move {
                let result = match registry.get(&spec.name) {
                    None => ToolResult::fail(format!("Tool '{}' not found", spec.name)),
                    Some(tool) => match timeout(call_timeout, tool.call(spec.args.clone())).await
                    {
                        Ok(result) => result,
                        Err(_) => ToolResult::fail(format!(
                            "timed out after {}s",
                            call_timeout.as_secs()
                        )),
                    },
                };
                (spec.clone(), result)
            }
        });

        let mut delta = StateDelta::new();
        for (spec, result) in join_all(calls).await {
            log::info!(
                "Tool {} -> {}",
                spec.name,
                if result.success { "ok" } else { "failed" }
            );
            let draft = if result.success {
                StepDraft::ok(names::EXECUTE_TOOLS, format!("call {}", spec.name), "ok")
            } else {
                StepDraft::failed(
                    names::EXECUTE_TOOLS,
                    format!("call {}", spec.name),
                    "failed",
                    result.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            }
            .with_input(spec.args.to_string());
            delta = delta.with_tool_result(spec.name, result).with_step(draft);
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::state::Intent;
    use crate::flow::tool::Tool;
    use once_cell::sync::Lazy;
    use serde_json::Value;
    use std::collections::BTreeMap;

    static NOOP_SCHEMA: Lazy<Value> = Lazy::new(|| json!({"type": "object", "properties": {}}));

    struct FixedTool {
        name: &'static str,
        result: ToolResult,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fixed"
        }
        fn schema(&self) -> &Value {
            &NOOP_SCHEMA
        }
        async fn call(&self, _args: Value) -> ToolResult {
            self.result.clone()
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never returns in time"
        }
        fn schema(&self) -> &Value {
            &NOOP_SCHEMA
        }
        async fn call(&self, _args: Value) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ToolResult::ok(json!({}))
        }
    }

    fn state_with_intent(intent_type: IntentType, entities: BTreeMap<String, Vec<String>>) -> WorkflowState {
        let mut state = WorkflowState::for_user_message("test");
        state.merge(StateDelta::new().with_intent(Intent {
            intent_type,
            confidence: 0.85,
            entities,
        }));
        state
    }

    #[tokio::test]
    async fn test_analyze_intent_sets_intent_and_step() {
        let state = WorkflowState::for_user_message("What is our IRR?");
        let delta = AnalyzeIntent.run(&state).await;

        assert_eq!(delta.intent.unwrap().intent_type, IntentType::Calculation);
        assert_eq!(delta.confidence, Some(0.85));
        assert_eq!(delta.steps.len(), 1);
        assert!(delta.steps[0].success);
        // the node only declares what it changes
        assert!(delta.messages.is_empty());
        assert!(delta.tool_results.is_empty());
    }

    #[tokio::test]
    async fn test_select_tools_for_calculation() {
        let mut entities = BTreeMap::new();
        entities.insert("metrics".to_string(), vec!["IRR".to_string(), "MOIC".to_string()]);
        let state = state_with_intent(IntentType::Calculation, entities);

        let delta = SelectTools.run(&state).await;
        let specs = delta.pending_tools.unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "find_financial_metric");
        assert_eq!(specs[0].args["metricName"], "IRR");
        assert_eq!(specs[1].args["metricName"], "MOIC");
    }

    #[tokio::test]
    async fn test_select_tools_for_formatting() {
        let mut entities = BTreeMap::new();
        entities.insert("ranges".to_string(), vec!["A1:B5".to_string()]);
        entities.insert("colors".to_string(), vec!["yellow".to_string()]);
        let state = state_with_intent(IntentType::Formatting, entities);

        let delta = SelectTools.run(&state).await;
        let specs = delta.pending_tools.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "format_cells");
        assert_eq!(specs[0].args["range"], "A1:B5");
        assert_eq!(specs[0].args["fillColor"], "yellow");
    }

    #[tokio::test]
    async fn test_select_tools_calculation_without_metric_falls_back_to_search() {
        let state = state_with_intent(IntentType::Calculation, BTreeMap::new());
        let delta = SelectTools.run(&state).await;
        let specs = delta.pending_tools.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "search_cells");
    }

    #[tokio::test]
    async fn test_request_clarification_is_dead_end_behavior() {
        let state = WorkflowState::for_user_message("hm");
        let delta = RequestClarification.run(&state).await;

        assert_eq!(delta.needs_clarification, Some(true));
        assert_eq!(delta.messages.len(), 1);
        assert_eq!(delta.messages[0].kind, MessageKind::Clarification);
        assert!(delta.messages[0].content.contains("What is our IRR?"));
        // never selects or calls tools
        assert!(delta.pending_tools.is_none());
        assert!(delta.tool_results.is_empty());
    }

    #[tokio::test]
    async fn test_execute_tools_isolates_failures() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedTool {
            name: "good",
            result: ToolResult::ok(json!({"v": 1})),
        }));
        registry.register(Arc::new(FixedTool {
            name: "bad",
            result: ToolResult::fail("boom"),
        }));
        let node = ExecuteTools::new(Arc::new(registry), Duration::from_secs(5));

        let mut state = WorkflowState::for_user_message("go");
        state.merge(StateDelta::new().with_pending_tools(vec![
            ToolSpec::new("good", json!({})),
            ToolSpec::new("bad", json!({})),
            ToolSpec::new("missing", json!({})),
        ]));

        let delta = node.run(&state).await;
        assert_eq!(delta.tool_results.len(), 3);
        assert!(delta.tool_results["good"].success);
        assert!(!delta.tool_results["bad"].success);
        assert!(delta.tool_results["missing"]
            .error
            .as_deref()
            .unwrap()
            .contains("not found"));

        // one audit entry per tool, success mirrored
        assert_eq!(delta.steps.len(), 3);
        assert_eq!(delta.steps.iter().filter(|s| s.success).count(), 1);
    }

    #[tokio::test]
    async fn test_execute_tools_times_out_slow_calls() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));
        let node = ExecuteTools::new(Arc::new(registry), Duration::from_millis(20));

        let mut state = WorkflowState::for_user_message("go");
        state.merge(
            StateDelta::new().with_pending_tools(vec![ToolSpec::new("slow", json!({}))]),
        );

        let delta = node.run(&state).await;
        assert!(!delta.tool_results["slow"].success);
        assert!(delta.tool_results["slow"]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_execute_tools_with_nothing_pending() {
        let node = ExecuteTools::new(Arc::new(ToolRegistry::new()), Duration::from_secs(5));
        let state = WorkflowState::for_user_message("go");

        let delta = node.run(&state).await;
        assert!(delta.tool_results.is_empty());
        assert_eq!(delta.steps.len(), 1);
        assert_eq!(delta.steps[0].result, "nothing to execute");
    }

    #[test]
    fn test_search_query_prefers_quoted_phrase() {
        let entities = BTreeMap::new();
        assert_eq!(
            search_query("find \"working capital\" cells", &entities),
            "working capital"
        );

        let mut entities = BTreeMap::new();
        entities.insert("metrics".to_string(), vec!["EBITDA".to_string()]);
        assert_eq!(search_query("find ebitda rows", &entities), "EBITDA");
    }
}
