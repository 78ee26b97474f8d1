/// Per-row image difference columns

pub mod metric;
pub mod worker;

pub use metric::{mean_abs_difference, resample, WORKING_WIDTH};
pub use worker::{DiffEvent, DiffJob, DiffPlan, DiffRun, DiffSummary, DiffWorker, RowFailure};
