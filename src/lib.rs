/// Image set alignment and comparison
///
/// Output trees of parallel pipelines are scanned, matched by a
/// path-derived identity, laid out as one comparison table and optionally
/// annotated with per-row image differences. Tables persist as JSON reports.

pub mod cache;
pub mod color;
pub mod config;
pub mod diff;
pub mod error;
pub mod image_io;
pub mod scan;
pub mod session;
pub mod state;

pub use cache::{CacheSize, FileCache};
pub use config::ComparisonConfig;
pub use error::{ImcompError, Result};
pub use session::{AppContext, Session, Verbosity};
