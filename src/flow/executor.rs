// SPDX-License-Identifier: MIT

//! Compiled graph execution.
//!
//! One node runs to completion (including any awaited I/O) before the next
//! node is chosen; there is no parallel node execution. The step budget
//! bounds the number of node transitions, not wall-clock time.

use crate::flow::graph::{Branch, Node, END};
use crate::flow::state::{Step, StepDraft, StateDelta, WorkflowState};
use futures::stream::{self, Stream};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Executor knobs, fixed at compile time.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Maximum number of node executions per run
    pub step_budget: u32,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { step_budget: 20 }
    }
}

/// One yielded unit of progress from `stream`.
pub struct StepEvent {
    /// Name of the node that just ran
    pub node: String,
    /// Snapshot of the state after the node's delta was merged
    pub state: WorkflowState,
    /// The audit log entry recorded for this execution
    pub step: Step,
}

/// A validated, runnable graph. Construct via `GraphDefinition::compile`.
pub struct ExecutableGraph {
    nodes: BTreeMap<String, Arc<dyn Node>>,
    edges: BTreeMap<String, String>,
    branches: BTreeMap<String, Branch>,
    entry: String,
    options: ExecutorOptions,
}

struct Cursor {
    state: WorkflowState,
    current: Option<String>,
    executed: u32,
}

impl ExecutableGraph {
    pub(crate) fn new(
        nodes: BTreeMap<String, Arc<dyn Node>>,
        edges: BTreeMap<String, String>,
        branches: BTreeMap<String, Branch>,
        entry: String,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            nodes,
            edges,
            branches,
            entry,
            options,
        }
    }

    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Run to completion and return the final state.
    ///
    /// Stops at the terminal marker or when the step budget is exhausted,
    /// returning whatever state exists at that point. Callers that care
    /// whether the terminal marker was actually reached can inspect the
    /// audit log.
    pub async fn invoke(&self, state: WorkflowState) -> WorkflowState {
        let mut cursor = self.cursor(state);
        while self.advance(&mut cursor).await.is_some() {}
        cursor.state
    }

    /// Run step-by-step, yielding after each node execution.
    ///
    /// The stream is finite and not restartable; a fresh call re-runs from
    /// the given initial state. `invoke` and `stream` produce identical
    /// final state for the same initial state.
    pub fn stream(&self, state: WorkflowState) -> impl Stream<Item = StepEvent> + '_ {
        stream::unfold(self.cursor(state), move |mut cursor| async move {
            let (node, step) = self.advance(&mut cursor).await?;
            let event = StepEvent {
                node,
                state: cursor.state.clone(),
                step,
            };
            Some((event, cursor))
        })
    }

    fn cursor(&self, state: WorkflowState) -> Cursor {
        Cursor {
            state,
            current: Some(self.entry.clone()),
            executed: 0,
        }
    }

    /// Execute the current node, merge its delta, resolve the next node.
    async fn advance(&self, cursor: &mut Cursor) -> Option<(String, Step)> {
        let name = cursor.current.take()?;
        if cursor.executed >= self.options.step_budget {
            log::warn!(
                "Step budget ({}) exhausted at node '{}'",
                self.options.step_budget,
                name
            );
            return None;
        }

        // Validated at compile time; a missing node here is unreachable.
        let node = self.nodes.get(&name)?.clone();
        log::debug!("Executing node: {}", name);

        let logged_before = cursor.state.processing_steps.len();
        let delta = node.run(&cursor.state).await;
        cursor.state.merge(delta);
        cursor.executed += 1;

        // Every node execution leaves an audit entry; nodes that did not
        // record their own step get a generic one.
        if cursor.state.processing_steps.len() == logged_before {
            cursor.state.merge(
                StateDelta::new().with_step(StepDraft::ok(&name, "node", "completed")),
            );
        }
        let step = cursor
            .state
            .processing_steps
            .last()
            .cloned()
            .expect("merge just appended a step");

        cursor.current = self.next_node(&name, &cursor.state);
        Some((name, step))
    }

    /// Conditional edge first, then direct edge, otherwise terminate.
    /// An unmapped conditional key also terminates (degrade-to-stop).
    fn next_node(&self, from: &str, state: &WorkflowState) -> Option<String> {
        if let Some(branch) = self.branches.get(from) {
            let target = (branch.resolve)(state)?;
            return if target == END { None } else { Some(target) };
        }
        if let Some(target) = self.edges.get(from) {
            return if target == END {
                None
            } else {
                Some(target.clone())
            };
        }
        None
    }
}
