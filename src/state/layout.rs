/// Column layout of the comparison table
///
/// Derives the column names, the difference pairs, the window title and the
/// default report file name from the image sets and the configuration.

use std::path::Path;
use tracing::{debug, warn};

use super::data::{DiffPair, ImageSet, UNIQUE_NAME};
use crate::config::ComparisonConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    /// All columns in display order, `Unique Name` first
    pub columns: Vec<String>,
    /// Primary input column
    pub input_column: String,
    /// One image column per set, same order as the sets
    pub set_columns: Vec<String>,
    /// Derived difference columns
    pub diff_pairs: Vec<DiffPair>,
    pub title: String,
    pub default_report_file: String,
}

impl ColumnLayout {
    pub fn new(image_sets: &[ImageSet], config: &ComparisonConfig) -> Self {
        let prefix = config.outputs.first().map(String::as_str).unwrap_or("out");
        if config.outputs.len() > 1 {
            debug!("only the first output prefix '{}' is used", prefix);
        }

        let unique_directory = image_sets
            .windows(2)
            .all(|pair| pair[0].directory == pair[1].directory);

        let set_columns: Vec<String> = image_sets
            .iter()
            .enumerate()
            .map(|(idx, set)| match &set.name {
                Some(name) => name.clone(),
                None if unique_directory => format!("{}{}", prefix, set.suffix),
                None => format!("{}_set{}", prefix, idx),
            })
            .collect();

        let image_columns: Vec<&String> = std::iter::once(&config.input).chain(&set_columns).collect();
        let diff_pairs: Vec<DiffPair> = config
            .diff
            .iter()
            .filter_map(|[left, right]| {
                if image_columns.contains(&left) && image_columns.contains(&right) {
                    Some(DiffPair::new(left.clone(), right.clone()))
                } else {
                    warn!("diff pair {}/{} does not name two image columns", left, right);
                    None
                }
            })
            .collect();

        let mut columns = vec![UNIQUE_NAME.to_string(), config.input.clone()];
        columns.extend(set_columns.iter().cloned());
        columns.extend(diff_pairs.iter().map(|pair| pair.name.clone()));

        let (title, report_stem) = describe_sets(image_sets);

        Self {
            columns,
            input_column: config.input.clone(),
            set_columns,
            diff_pairs,
            title: format!("Image Set Comparison{}", title),
            default_report_file: format!("{}.json", report_stem),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Title fragments and report file stem for a list of sets
fn describe_sets(image_sets: &[ImageSet]) -> (String, String) {
    let mut title = String::new();
    let mut report = String::from("_report");
    let mut previous_basedir = String::new();
    let mut first_basedir = String::new();

    for (idx, set) in image_sets.iter().enumerate() {
        if let Some(name) = &set.name {
            title.push_str(&format!(" -- {}", name));
            report.push_str(&format!("_{}", name));
            continue;
        }

        let mut basedir = dir_basename(&set.directory);
        if idx == 0 {
            first_basedir = basedir.clone();
        }

        if basedir == previous_basedir {
            title.push_str(&format!(" -- {}", set.suffix));
            report.push_str(&format!("_{}", set.suffix));
        } else {
            if idx > 0 {
                let common = common_prefix_len(&first_basedir, &basedir);
                basedir = basedir[common..].to_string();
            }
            title.push_str(&format!(" -- {}:{}", set.directory.display(), set.suffix));
            report.push_str(&format!("_{}_{}", basedir, set.suffix));
        }
        previous_basedir = basedir;
    }

    (title, report)
}

fn dir_basename(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Byte length of the common prefix, on a char boundary
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, ca), cb)| ca == cb)
        .last()
        .map(|((i, c), _)| i + c.len_utf8())
        .unwrap_or(0)
}
