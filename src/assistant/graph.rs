// SPDX-License-Identifier: MIT

//! Wiring of the assistant graph.
//!
//! ```text
//! analyze_intent ──(confidence < 0.7)──> request_clarification ──> END
//!        │
//!        └─(otherwise)──> select_tools ──> execute_tools ──> synthesize_response ──> END
//! ```

use crate::assistant::nodes::{
    names, AnalyzeIntent, ExecuteTools, RequestClarification, SelectTools,
};
use crate::assistant::synthesize::SynthesizeResponse;
use crate::flow::error::GraphConfigError;
use crate::flow::executor::{ExecutableGraph, ExecutorOptions};
use crate::flow::graph::{GraphDefinition, RouteKey, END};
use crate::flow::registry::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Route taken out of `analyze_intent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentRoute {
    Clarify,
    Continue,
}

impl RouteKey for IntentRoute {}

/// Composition-root knobs for one assistant instance.
#[derive(Debug, Clone, Copy)]
pub struct AssistantConfig {
    pub step_budget: u32,
    /// Wall-clock bound per tool call
    pub tool_timeout: Duration,
    /// Intents below this confidence are routed to clarification
    pub clarification_threshold: f64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            step_budget: 20,
            tool_timeout: Duration::from_secs(30),
            clarification_threshold: 0.7,
        }
    }
}

/// Build and compile the assistant graph over an injected registry.
pub fn build_assistant_graph(
    registry: Arc<ToolRegistry>,
    config: AssistantConfig,
) -> Result<ExecutableGraph, GraphConfigError> {
    let threshold = config.clarification_threshold;

    let mut def = GraphDefinition::new();
    def.add_node(names::ANALYZE_INTENT, AnalyzeIntent)
        .add_node(names::SELECT_TOOLS, SelectTools)
        .add_node(
            names::EXECUTE_TOOLS,
            ExecuteTools::new(registry, config.tool_timeout),
        )
        .add_node(names::REQUEST_CLARIFICATION, RequestClarification)
        .add_node(names::SYNTHESIZE_RESPONSE, SynthesizeResponse)
        .set_entry_point(names::ANALYZE_INTENT)
        .add_conditional_edge(
            names::ANALYZE_INTENT,
            move |state| {
                if state.confidence < threshold {
                    IntentRoute::Clarify
                } else {
                    IntentRoute::Continue
                }
            },
            [
                (IntentRoute::Clarify, names::REQUEST_CLARIFICATION),
                (IntentRoute::Continue, names::SELECT_TOOLS),
            ],
        )
        .add_edge(names::REQUEST_CLARIFICATION, END)
        .add_edge(names::SELECT_TOOLS, names::EXECUTE_TOOLS)
        .add_edge(names::EXECUTE_TOOLS, names::SYNTHESIZE_RESPONSE)
        .add_edge(names::SYNTHESIZE_RESPONSE, END);

    def.compile(ExecutorOptions {
        step_budget: config.step_budget,
    })
}
