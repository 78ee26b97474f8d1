/// State management module
///
/// This module handles all table state, including:
/// - Shared data structures (data.rs)
/// - Run parameters and image-set resolution (params.rs)
/// - Column naming (layout.rs)
/// - The row store and report reconciliation (table.rs)
/// - Report files on disk (report.rs)

pub mod data;
pub mod params;
pub mod layout;
pub mod table;
pub mod report;

pub use data::{CellValue, DiffPair, ImageSet, UNIQUE_NAME};
pub use layout::ColumnLayout;
pub use params::{merge_loaded_params, resolve_image_sets, Params};
pub use report::{read_report, write_report, Report, ReportRow};
pub use table::ComparisonTable;
