// SPDX-License-Identifier: MIT

//! The orchestration runtime: reducer-merged state, graph definition and
//! compilation, sequential execution, and the tool contract.

pub mod error;
pub mod executor;
pub mod graph;
pub mod registry;
pub mod state;
pub mod tool;

pub use error::{GraphConfigError, SheetError};
pub use executor::{ExecutableGraph, ExecutorOptions, StepEvent};
pub use graph::{FnNode, GraphDefinition, Node, RouteKey, END};
pub use registry::ToolRegistry;
pub use state::{
    Intent, IntentType, Message, MessageKind, Role, Snapshot, StateDelta, Step, StepDraft,
    WorkflowState,
};
pub use tool::{Tool, ToolResult, ToolSpec};
