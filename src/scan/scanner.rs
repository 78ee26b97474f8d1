/// Set scanner: walks one image-set directory into an identity -> path listing

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::identity::identity_for;
use crate::error::{ImcompError, Result};

/// Which files of a set directory take part in the comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Accepted extensions, lowercase, without the leading dot
    pub extensions: Vec<String>,
    /// Every one of these must appear in the file name
    pub substrings: Vec<String>,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self::new(&[".jpg", ".png"], &[] as &[&str], true)
    }
}

impl ScanFilter {
    /// Build a filter, normalizing `.JPG`-style extensions and dropping empty substrings
    pub fn new<E: AsRef<str>, S: AsRef<str>>(extensions: &[E], substrings: &[S], recursive: bool) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            substrings: substrings
                .iter()
                .map(|s| s.as_ref().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            recursive,
        }
    }

    /// Check extension (case-insensitive) and name substrings
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(extension) = path.extension() else {
            return false;
        };
        let ext = extension.to_string_lossy().to_lowercase();
        if !self.extensions.iter().any(|e| *e == ext) {
            return false;
        }

        let filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        self.substrings.iter().all(|s| filename.contains(s.as_str()))
    }
}

/// Identity -> path listing of one set, in discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutput {
    pub entries: IndexMap<String, PathBuf>,
    /// Files whose identity was already taken; the later file wins
    pub collisions: usize,
}

impl ScanOutput {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<&PathBuf> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }
}

/// Walk `directory` and list every qualifying file under its identity.
///
/// Entries are visited sorted by file name so the listing order is stable
/// across runs. An unreadable root directory is a [`ImcompError::Scan`];
/// unreadable entries below it are skipped.
pub fn scan(directory: &Path, filter: &ScanFilter, suffix: &str) -> Result<ScanOutput> {
    let mut walker = WalkDir::new(directory).follow_links(true).sort_by_file_name();
    if !filter.recursive {
        walker = walker.max_depth(1);
    }

    let mut output = ScanOutput::default();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ImcompError::Scan {
                    path: directory.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() || !filter.accepts(entry.path()) {
            continue;
        }

        let Some(identity) = identity_for(directory, entry.path(), suffix) else {
            continue;
        };

        if let Some(previous) = output.entries.insert(identity, entry.path().to_path_buf()) {
            output.collisions += 1;
            debug!("identity collision, replacing {}", previous.display());
        }
    }

    if output.collisions > 0 {
        warn!(
            "{} identity collisions in {} (later files replaced earlier ones)",
            output.collisions,
            directory.display()
        );
    }
    debug!("scanned {}: {} files", directory.display(), output.len());

    Ok(output)
}

/// Like [`scan`], but a failing directory is logged and yields an empty set
pub fn scan_or_empty(directory: &Path, filter: &ScanFilter, suffix: &str) -> ScanOutput {
    scan(directory, filter, suffix).unwrap_or_else(|e| {
        warn!("{}", e);
        ScanOutput::default()
    })
}
