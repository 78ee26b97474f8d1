/// Directory scanning and cross-set alignment
///
/// This module handles:
/// - Turning a file path plus a set suffix into an identity key (identity.rs)
/// - Walking one set directory into an identity -> path listing (scanner.rs)
/// - Intersecting N listings into ordered aligned rows (align.rs)

pub mod identity;
pub mod scanner;
pub mod align;

pub use align::{align, AlignedRows};
pub use identity::identity_for;
pub use scanner::{scan, scan_or_empty, ScanFilter, ScanOutput};
