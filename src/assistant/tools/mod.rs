// SPDX-License-Identifier: MIT

//! The assistant's callable capabilities.

pub mod format;
pub mod metrics;
pub mod search;

pub use format::FormatCellsTool;
pub use metrics::{FindFinancialMetricTool, MetricResolver, ResolvedMetric, Strategy};
pub use search::SearchCellsTool;

use crate::flow::registry::ToolRegistry;
use crate::sheets::source::Workbook;
use std::sync::Arc;

/// Build the standard registry over one workbook.
pub fn standard_registry(workbook: Arc<dyn Workbook>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FindFinancialMetricTool::new(workbook.clone())));
    registry.register(Arc::new(FormatCellsTool::new(workbook.clone())));
    registry.register(Arc::new(SearchCellsTool::new(workbook)));
    registry
}
