// SPDX-License-Identifier: MIT

//! Workflow state and the reducer merge contract.
//!
//! One `WorkflowState` flows through the graph. Nodes never mutate it
//! directly: each node returns a `StateDelta` naming only the fields it
//! intends to change, and `WorkflowState::merge` folds the delta in under a
//! fixed per-field reducer (append for the two logs, shallow-merge for tool
//! results, overwrite for everything else). Fields absent from the delta
//! are untouched, and repeated merges are associative, so `invoke` and
//! `stream` converge on the same final state for the same node order.

use crate::flow::tool::{ToolResult, ToolSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// What kind of message this is, beyond its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    Clarification,
    FinalResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Chat,
        }
    }

    pub fn assistant(content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Closed set of request categories the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Formatting,
    Calculation,
    Search,
    Unclear,
}

/// Classified intent for the latest user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub confidence: f64,
    /// Extracted entities keyed by category ("colors", "metrics", "ranges")
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
}

/// One entry of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based, strictly increasing with no gaps; assigned by the merge
    pub step_number: u32,
    pub node: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub result: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A step as a node describes it, before the merge assigns its number.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDraft {
    pub node: String,
    pub action: String,
    pub input: Option<String>,
    pub result: String,
    pub success: bool,
    pub error: Option<String>,
}

impl StepDraft {
    pub fn ok(node: &str, action: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            node: node.to_string(),
            action: action.into(),
            input: None,
            result: result.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(
        node: &str,
        action: impl Into<String>,
        result: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            node: node.to_string(),
            action: action.into(),
            input: None,
            result: result.into(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// The single mutable object threaded through the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Conversation so far, in insertion order (reducer: append)
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Latest classified intent (reducer: overwrite)
    #[serde(default)]
    pub intent: Option<Intent>,
    /// Results keyed by tool name (reducer: shallow-merge, last write per key wins)
    #[serde(default)]
    pub tool_results: BTreeMap<String, ToolResult>,
    /// Tool calls selected for the current turn (reducer: overwrite)
    #[serde(default)]
    pub pending_tools: Vec<ToolSpec>,
    /// Append-only audit log (reducer: append)
    #[serde(default)]
    pub processing_steps: Vec<Step>,
    /// Confidence of the current intent, in [0, 1] (reducer: overwrite)
    #[serde(default)]
    pub confidence: f64,
    /// Whether the turn ended by asking the user to rephrase (reducer: overwrite)
    #[serde(default)]
    pub needs_clarification: bool,
}

impl WorkflowState {
    /// Fresh per-turn state seeded with the latest user message.
    pub fn for_user_message(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
            ..Default::default()
        }
    }

    /// Latest user message content, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Latest assistant message, if any.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Fold a node's partial output into this state.
    ///
    /// Step numbering is assigned here, from the current log length, which
    /// is what makes the audit log gapless no matter how many drafts a node
    /// emits.
    pub fn merge(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        if let Some(intent) = delta.intent {
            self.intent = Some(intent);
        }
        for (name, result) in delta.tool_results {
            self.tool_results.insert(name, result);
        }
        if let Some(pending) = delta.pending_tools {
            self.pending_tools = pending;
        }
        for draft in delta.steps {
            let step_number = self.processing_steps.len() as u32 + 1;
            self.processing_steps.push(Step {
                step_number,
                node: draft.node,
                action: draft.action,
                input: draft.input,
                result: draft.result,
                success: draft.success,
                error: draft.error,
                timestamp: Utc::now(),
            });
        }
        if let Some(confidence) = delta.confidence {
            self.confidence = confidence;
        }
        if let Some(needs) = delta.needs_clarification {
            self.needs_clarification = needs;
        }
    }
}

/// Partial state: what one node execution wants changed.
///
/// Empty collections and `None` fields leave the corresponding state field
/// untouched.
#[derive(Debug, Default, Clone)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub intent: Option<Intent>,
    pub tool_results: BTreeMap<String, ToolResult>,
    pub pending_tools: Option<Vec<ToolSpec>>,
    pub steps: Vec<StepDraft>,
    pub confidence: Option<f64>,
    pub needs_clarification: Option<bool>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.confidence = Some(intent.confidence);
        self.intent = Some(intent);
        self
    }

    pub fn with_tool_result(mut self, name: impl Into<String>, result: ToolResult) -> Self {
        self.tool_results.insert(name.into(), result);
        self
    }

    pub fn with_pending_tools(mut self, specs: Vec<ToolSpec>) -> Self {
        self.pending_tools = Some(specs);
        self
    }

    pub fn with_step(mut self, draft: StepDraft) -> Self {
        self.steps.push(draft);
        self
    }

    pub fn with_clarification(mut self, needs: bool) -> Self {
        self.needs_clarification = Some(needs);
        self
    }
}

/// External persistence contract for continuing a conversation across
/// turns. Field names follow the host application's snapshot shape, hence
/// camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub tool_results: BTreeMap<String, ToolResult>,
    pub user_intent: Option<Intent>,
    pub current_step: String,
    pub processing_steps: Vec<Step>,
}

impl Snapshot {
    /// Capture the state at the end of a turn. `current_step` is the name
    /// of the last node that ran (or the terminal marker).
    pub fn capture(state: &WorkflowState, current_step: impl Into<String>) -> Self {
        Self {
            messages: state.messages.clone(),
            tool_results: state.tool_results.clone(),
            user_intent: state.intent.clone(),
            current_step: current_step.into(),
            processing_steps: state.processing_steps.clone(),
        }
    }

    /// Rebuild a working state from a snapshot. Confidence is recovered
    /// from the stored intent; clarification pending is recovered from the
    /// last assistant message kind.
    pub fn restore(self) -> WorkflowState {
        let confidence = self.user_intent.as_ref().map(|i| i.confidence).unwrap_or(0.0);
        let needs_clarification = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.kind == MessageKind::Clarification)
            .unwrap_or(false);
        WorkflowState {
            messages: self.messages,
            intent: self.user_intent,
            tool_results: self.tool_results,
            pending_tools: Vec::new(),
            processing_steps: self.processing_steps,
            confidence,
            needs_clarification,
        }
    }
}
