// SPDX-License-Identifier: MIT

//! Typed error handling for gridpilot
//!
//! Compile-time graph errors are the only fatal class. Everything that can
//! go wrong while a turn is running is recovered at the node boundary and
//! represented as data (a failed `Step` or `ToolResult`), never as an
//! exception crossing node boundaries.

use thiserror::Error;

/// Errors raised while compiling a graph definition.
///
/// These are programming errors in the graph wiring and are raised before
/// any node runs. Callers must fix the definition; there is no recovery.
#[derive(Debug, Error)]
pub enum GraphConfigError {
    /// No entry point was declared before compile
    #[error("Graph has no entry point")]
    MissingEntryPoint,

    /// Entry point names a node that was never added
    #[error("Entry point '{0}' is not a declared node")]
    UnknownEntryPoint(String),

    /// An edge references an undeclared source node
    #[error("Edge source '{0}' is not a declared node")]
    UnknownEdgeSource(String),

    /// An edge or conditional route targets an undeclared node
    #[error("Edge from '{from}' targets undeclared node '{to}'")]
    UnknownEdgeTarget { from: String, to: String },

    /// Two nodes were registered under the same name
    #[error("Node '{0}' is declared twice")]
    DuplicateNode(String),
}

/// Errors from the workbook collaborator.
///
/// Tools convert these into failed `ToolResult`s; they never escape
/// `execute_tools`.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Sheet name does not exist in the workbook
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    /// Range string could not be parsed as A1 notation
    #[error("Invalid range reference: {0}")]
    BadRange(String),
}
