// SPDX-License-Identifier: MIT

//! Name-keyed tool lookup.
//!
//! A registry is populated once at startup, wrapped in an `Arc`, and handed
//! to the nodes that need it. There is no ambient global registry; every
//! consumer receives its registry explicitly.

use crate::flow::tool::Tool;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name. Re-registering a name replaces
    /// the previous tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        log::debug!("Registered tool: {}", tool.name());
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
