// SPDX-License-Identifier: MIT

//! Workbook collaborator and grid utilities.

pub mod a1;
pub mod numeric;
pub mod source;

pub use a1::{cell_name, parse_cell, parse_range, RangeRef};
pub use source::{Cell, CellFormat, CellMatch, CellValue, InMemoryWorkbook, RangeData, Workbook};
