// SPDX-License-Identifier: MIT

//! Graph definition and compilation.
//!
//! A `GraphDefinition` declares nodes, edges and the entry point without
//! executing anything. `compile` validates the wiring up front and produces
//! an `ExecutableGraph`; a bad node reference is a `GraphConfigError` at
//! compile time, never a surprise mid-turn.

use crate::flow::error::GraphConfigError;
use crate::flow::executor::{ExecutableGraph, ExecutorOptions};
use crate::flow::state::{StateDelta, WorkflowState};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Terminal marker: an edge targeting `END` stops the run.
pub const END: &str = "__end__";

/// A named step function over the shared state.
///
/// Nodes must not fail: anything that goes wrong inside a node is captured
/// into the returned delta as a failed step or tool result. The signature
/// makes that contract structural: there is no error channel.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> StateDelta;
}

/// Wrap a plain synchronous closure as a node. Mostly useful in tests and
/// small graphs; real nodes implement `Node` directly.
pub struct FnNode<F>(pub F);

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&WorkflowState) -> StateDelta + Send + Sync,
{
    async fn run(&self, state: &WorkflowState) -> StateDelta {
        (self.0)(state)
    }
}

/// Marker for the closed key enum of one conditional edge.
///
/// Each conditional edge declares its own small enum (e.g.
/// `IntentRoute::{Clarify, Continue}`) so the selector and the route table
/// are checked against each other by the type system instead of meeting on
/// stringly-typed keys at run time.
pub trait RouteKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

pub(crate) struct Branch {
    /// Selector composed with its route table; `None` means the selector
    /// produced a key the table does not map
    pub resolve: Box<dyn Fn(&WorkflowState) -> Option<String> + Send + Sync>,
    /// Route targets kept separately so compile can validate them
    pub targets: Vec<String>,
}

/// Declarative graph: nodes, edges, conditional edges, entry point.
#[derive(Default)]
pub struct GraphDefinition {
    pub(crate) nodes: BTreeMap<String, Arc<dyn Node>>,
    pub(crate) edges: BTreeMap<String, String>,
    pub(crate) branches: BTreeMap<String, Branch>,
    pub(crate) entry: Option<String>,
    duplicates: Vec<String>,
}

impl GraphDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node. Declaring the same name twice is reported by
    /// `compile`, not silently overwritten.
    pub fn add_node(&mut self, name: &str, node: impl Node + 'static) -> &mut Self {
        if self
            .nodes
            .insert(name.to_string(), Arc::new(node))
            .is_some()
        {
            self.duplicates.push(name.to_string());
        }
        self
    }

    /// Declare a direct edge. `to` may be `END`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.edges.insert(from.to_string(), to.to_string());
        self
    }

    /// Declare a conditional edge out of `from`.
    ///
    /// `selector` inspects the state and returns a key of the edge's own
    /// closed enum; `routes` maps every key the edge intends to handle to a
    /// target node (or `END`). A selector result missing from the table
    /// terminates the run; see the executor for that contract.
    pub fn add_conditional_edge<K, S>(
        &mut self,
        from: &str,
        selector: S,
        routes: impl IntoIterator<Item = (K, &'static str)>,
    ) -> &mut Self
    where
        K: RouteKey,
        S: Fn(&WorkflowState) -> K + Send + Sync + 'static,
    {
        let table: HashMap<K, String> = routes
            .into_iter()
            .map(|(k, to)| (k, to.to_string()))
            .collect();
        let targets: Vec<String> = table.values().cloned().collect();
        let resolve = Box::new(move |state: &WorkflowState| {
            let key = selector(state);
            let target = table.get(&key).cloned();
            if target.is_none() {
                log::warn!("Conditional edge selected unmapped key {:?}", key);
            }
            target
        });
        self.branches
            .insert(from.to_string(), Branch { resolve, targets });
        self
    }

    pub fn set_entry_point(&mut self, name: &str) -> &mut Self {
        self.entry = Some(name.to_string());
        self
    }

    /// Validate the wiring and produce an executable graph.
    pub fn compile(self, options: ExecutorOptions) -> Result<ExecutableGraph, GraphConfigError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(GraphConfigError::DuplicateNode(name));
        }

        let entry = self.entry.ok_or(GraphConfigError::MissingEntryPoint)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphConfigError::UnknownEntryPoint(entry));
        }

        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphConfigError::UnknownEdgeSource(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(GraphConfigError::UnknownEdgeTarget {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        for (from, branch) in &self.branches {
            if !self.nodes.contains_key(from) {
                return Err(GraphConfigError::UnknownEdgeSource(from.clone()));
            }
            for to in &branch.targets {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(GraphConfigError::UnknownEdgeTarget {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        Ok(ExecutableGraph::new(
            self.nodes,
            self.edges,
            self.branches,
            entry,
            options,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> FnNode<impl Fn(&WorkflowState) -> StateDelta + Send + Sync> {
        FnNode(|_: &WorkflowState| StateDelta::new())
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestRoute {
        Left,
        Right,
    }
    impl RouteKey for TestRoute {}

    #[test]
    fn test_compile_minimal_graph() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop())
            .add_edge("a", END)
            .set_entry_point("a");
        assert!(def.compile(ExecutorOptions::default()).is_ok());
    }

    #[test]
    fn test_compile_rejects_missing_entry() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop()).add_edge("a", END);
        match def.compile(ExecutorOptions::default()) {
            Err(GraphConfigError::MissingEntryPoint) => {}
            other => panic!("expected MissingEntryPoint, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_compile_rejects_unknown_entry() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop()).set_entry_point("ghost");
        match def.compile(ExecutorOptions::default()) {
            Err(GraphConfigError::UnknownEntryPoint(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected UnknownEntryPoint, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_compile_rejects_unknown_edge_target() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop())
            .add_edge("a", "ghost")
            .set_entry_point("a");
        match def.compile(ExecutorOptions::default()) {
            Err(GraphConfigError::UnknownEdgeTarget { from, to }) => {
                assert_eq!(from, "a");
                assert_eq!(to, "ghost");
            }
            other => panic!("expected UnknownEdgeTarget, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_compile_rejects_unknown_conditional_target() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop())
            .add_conditional_edge(
                "a",
                |_| TestRoute::Left,
                [(TestRoute::Left, "ghost"), (TestRoute::Right, END)],
            )
            .set_entry_point("a");
        match def.compile(ExecutorOptions::default()) {
            Err(GraphConfigError::UnknownEdgeTarget { to, .. }) => assert_eq!(to, "ghost"),
            other => panic!("expected UnknownEdgeTarget, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_compile_rejects_duplicate_node() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop())
            .add_node("a", noop())
            .set_entry_point("a");
        match def.compile(ExecutorOptions::default()) {
            Err(GraphConfigError::DuplicateNode(name)) => assert_eq!(name, "a"),
            other => panic!("expected DuplicateNode, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_compile_rejects_edge_from_unknown_node() {
        let mut def = GraphDefinition::new();
        def.add_node("a", noop())
            .add_edge("ghost", "a")
            .set_entry_point("a");
        match def.compile(ExecutorOptions::default()) {
            Err(GraphConfigError::UnknownEdgeSource(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected UnknownEdgeSource, got {:?}", other.err()),
        }
    }
}
