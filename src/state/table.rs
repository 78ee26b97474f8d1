/// The comparison table: one row per aligned identity, one cell per column
///
/// The table is the only owner of cell values. Column statistics are updated
/// on every numeric write; colors are derived from them on demand.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::data::{CellValue, ImageSet, UNIQUE_NAME};
use super::layout::ColumnLayout;
use super::params::Params;
use super::report::{Report, ReportRow};
use crate::color::{CellColors, ColumnStats};
use crate::scan::AlignedRows;

#[derive(Debug, Clone)]
pub struct ComparisonTable {
    layout: ColumnLayout,
    /// Identity -> cells, indexed like `layout.columns`
    rows: IndexMap<String, Vec<CellValue>>,
    stats: ColumnStats,
    colors: CellColors,
}

impl ComparisonTable {
    /// Create one row per aligned identity.
    ///
    /// Set columns receive the aligned paths. With `guess_input`, the input
    /// column gets the first original file found next to the set outputs.
    pub fn build_from_alignment(
        image_sets: &[ImageSet],
        aligned: &AlignedRows,
        layout: ColumnLayout,
        guess_input: bool,
    ) -> Self {
        let input_index = layout.column_index(&layout.input_column);
        let set_indices: Vec<Option<usize>> = layout
            .set_columns
            .iter()
            .map(|name| layout.column_index(name))
            .collect();
        let first_suffix = image_sets.first().map(|s| s.suffix.as_str()).unwrap_or("");

        let mut rows = IndexMap::with_capacity(aligned.len());
        for (identity, paths) in aligned {
            let mut cells = vec![CellValue::from(""); layout.columns.len()];
            cells[0] = CellValue::from(identity.as_str());

            for (path, index) in paths.iter().zip(&set_indices) {
                if let Some(index) = index {
                    cells[*index] = CellValue::from(path.to_string_lossy().to_string());
                }
            }

            if guess_input {
                if let (Some(index), Some(original)) = (input_index, guess_original(paths, first_suffix)) {
                    cells[index] = CellValue::from(original.to_string_lossy().to_string());
                }
            }

            rows.insert(identity.clone(), cells);
        }

        if rows.is_empty() {
            warn!("no identity is common to all image sets, the table is empty");
        }

        Self {
            layout,
            rows,
            stats: ColumnStats::new(),
            colors: CellColors::new(),
        }
    }

    /// A table with columns but no rows
    pub fn empty(layout: ColumnLayout) -> Self {
        Self {
            layout,
            rows: IndexMap::new(),
            stats: ColumnStats::new(),
            colors: CellColors::new(),
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn columns(&self) -> &[String] {
        &self.layout.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.layout.column_index(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row identities in table order
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn row(&self, identity: &str) -> Option<&[CellValue]> {
        self.rows.get(identity).map(Vec::as_slice)
    }

    pub fn cell(&self, identity: &str, column: &str) -> Option<&CellValue> {
        let index = self.column_index(column)?;
        self.rows.get(identity)?.get(index)
    }

    pub fn stats(&self) -> &ColumnStats {
        &self.stats
    }

    pub fn colors(&self) -> &CellColors {
        &self.colors
    }

    /// Store a value and widen the column range.
    ///
    /// Returns false for unknown rows and columns, and for the reserved
    /// `Unique Name` column which is never overwritten.
    pub fn write_cell(&mut self, identity: &str, column: &str, value: CellValue) -> bool {
        let Some(index) = self.column_index(column).filter(|&i| !self.is_reserved(i)) else {
            return false;
        };
        self.write_at(identity, index, value)
    }

    /// `Unique Name` always holds the row identity
    fn is_reserved(&self, index: usize) -> bool {
        self.layout.columns.get(index).is_some_and(|name| name == UNIQUE_NAME)
    }

    fn write_at(&mut self, identity: &str, index: usize, value: CellValue) -> bool {
        let Some(cells) = self.rows.get_mut(identity) else {
            return false;
        };
        self.stats.observe(index, &value);
        cells[index] = value;
        true
    }

    /// Fill blank cells from a loaded report.
    ///
    /// Non-blank cells keep their value. Loaded text is re-typed (integer,
    /// float, text) before it is stored. Report rows without a matching table
    /// row are ignored. Returns the number of filled cells.
    pub fn reconcile(&mut self, report: &Report) -> usize {
        let mut filled = 0;
        let mut ignored = 0;

        for (identity, loaded) in &report.rows {
            if !self.rows.contains_key(identity) {
                ignored += 1;
                continue;
            }
            for (column, value) in loaded {
                let Some(index) = self.column_index(column).filter(|&i| !self.is_reserved(i)) else {
                    continue;
                };
                let is_blank = self.rows[identity.as_str()][index].is_empty();
                if is_blank && self.write_at(identity, index, value.clone().classified()) {
                    filled += 1;
                }
            }
        }

        if ignored > 0 {
            debug!("{} report rows have no match in the scanned sets", ignored);
        }
        filled
    }

    /// Snapshot rows into a report. `selection` restricts the export to the
    /// given row positions. `Unique Name` and blank cells are left out.
    pub fn to_report(&self, params: &Params, selection: Option<&[usize]>) -> Report {
        let mut report = Report::new(params.clone());
        let positions: Vec<usize> = match selection {
            Some(rows) => rows.to_vec(),
            None => (0..self.rows.len()).collect(),
        };

        for position in positions {
            let Some((identity, cells)) = self.rows.get_index(position) else {
                continue;
            };
            let row: ReportRow = self
                .layout
                .columns
                .iter()
                .zip(cells)
                .skip(1)
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(column, cell)| (column.clone(), cell.clone()))
                .collect();
            report.rows.insert(identity.clone(), row);
        }
        report
    }

    /// Every non-empty image path of the table (input and set columns)
    pub fn image_paths(&self) -> Vec<PathBuf> {
        let mut indices: Vec<usize> = self
            .layout
            .set_columns
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        indices.extend(self.column_index(&self.layout.input_column));

        self.rows
            .values()
            .flat_map(|cells| indices.iter().filter_map(move |&i| cells[i].as_text()))
            .filter(|text| !text.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Rebuild the colors of one column from the current stats
    pub fn recolor_column(&mut self, column: usize) {
        let cells = self
            .rows
            .iter()
            .filter_map(|(identity, cells)| cells.get(column).map(|cell| (identity.as_str(), cell)));
        self.colors.recolor_column(&self.stats, column, cells);
    }

    pub fn recolor_all(&mut self) {
        for column in 0..self.layout.columns.len() {
            self.recolor_column(column);
        }
    }
}

/// Look for the original input of a row next to its set outputs.
///
/// Each set path is tried as it is, then with the first set's suffix removed
/// from the file name. Several candidates may exist; the first one found wins.
fn guess_original(paths: &[PathBuf], first_suffix: &str) -> Option<PathBuf> {
    for path in paths {
        if path.is_file() {
            return Some(path.clone());
        }
        if first_suffix.is_empty() {
            continue;
        }
        let candidate = strip_from_name(path, first_suffix)?;
        if candidate.is_file() {
            return Some(candidate);
        }
        debug!("original file not found for {}", path.display());
    }
    None
}

fn strip_from_name(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy().replace(suffix, "");
    Some(path.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComparisonConfig;
    use crate::state::report::ReportRow;

    fn table() -> ComparisonTable {
        let sets = vec![ImageSet::new("/a", "_x"), ImageSet::new("/b", "_y")];
        let layout = ColumnLayout::new(&sets, &ComparisonConfig::default());
        let mut aligned = AlignedRows::new();
        for id in ["one", "two"] {
            aligned.insert(
                id.to_string(),
                vec![
                    PathBuf::from(format!("/a/{}_x.png", id)),
                    PathBuf::from(format!("/b/{}_y.png", id)),
                ],
            );
        }
        ComparisonTable::build_from_alignment(&sets, &aligned, layout, false)
    }

    #[test]
    fn test_rows_follow_alignment() {
        let table = table();
        assert_eq!(table.identities().collect::<Vec<_>>(), vec!["one", "two"]);
        assert_eq!(table.cell("one", UNIQUE_NAME), Some(&CellValue::from("one")));
        assert_eq!(table.cell("two", "out_set1"), Some(&CellValue::from("/b/two_y.png")));
        assert_eq!(table.cell("two", "input"), Some(&CellValue::from("")));
    }

    #[test]
    fn test_unique_name_is_reserved() {
        let mut table = table();
        assert!(!table.write_cell("one", UNIQUE_NAME, CellValue::from("other")));
        assert!(!table.write_cell("missing", "input", CellValue::from("x")));
        assert_eq!(table.cell("one", UNIQUE_NAME), Some(&CellValue::from("one")));
    }

    #[test]
    fn test_reconcile_fills_blanks_only() {
        let mut table = table();
        table.write_cell("one", "out_set0-out_set1", CellValue::from("5"));

        let mut report = Report::default();
        let mut row = ReportRow::new();
        row.insert("out_set0-out_set1".into(), CellValue::from("9"));
        row.insert("input".into(), CellValue::from("12"));
        row.insert(UNIQUE_NAME.into(), CellValue::from("hijack"));
        report.rows.insert("one".into(), row);
        let mut row = ReportRow::new();
        row.insert("out_set0-out_set1".into(), CellValue::from("0.5"));
        report.rows.insert("two".into(), row);
        report.rows.insert("ghost".into(), ReportRow::new());

        let filled = table.reconcile(&report);
        assert_eq!(filled, 2);
        assert_eq!(table.cell("one", "out_set0-out_set1"), Some(&CellValue::from("5")));
        assert_eq!(table.cell("one", "input"), Some(&CellValue::Integer(12)));
        assert_eq!(table.cell("two", "out_set0-out_set1"), Some(&CellValue::Float(0.5)));
        assert_eq!(table.cell("one", UNIQUE_NAME), Some(&CellValue::from("one")));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stats_follow_writes() {
        let mut table = table();
        let col = table.column_index("out_set0-out_set1").unwrap();
        table.write_cell("one", "out_set0-out_set1", CellValue::Float(1.0));
        table.write_cell("two", "out_set0-out_set1", CellValue::Float(3.0));
        let range = table.stats().range(col).unwrap();
        assert_eq!((range.min, range.max), (1.0, 3.0));

        table.recolor_all();
        assert!(table.colors().get("one", col).is_some());
        assert!(table.colors().get("one", 0).is_none());
    }

    #[test]
    fn test_to_report_skips_reserved_and_blank() {
        let mut table = table();
        table.write_cell("two", "out_set0-out_set1", CellValue::Float(2.5));

        let report = table.to_report(&Params::new(), None);
        assert_eq!(report.rows.len(), 2);
        let row = &report.rows["two"];
        assert!(!row.contains_key(UNIQUE_NAME));
        assert!(!row.contains_key("input"));
        assert_eq!(row["out_set0-out_set1"], CellValue::Float(2.5));

        let partial = table.to_report(&Params::new(), Some(&[1, 7]));
        assert_eq!(partial.rows.keys().collect::<Vec<_>>(), vec!["two"]);
    }

    #[test]
    fn test_image_paths() {
        assert_eq!(table().image_paths().len(), 4);
    }

    #[test]
    fn test_guess_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("shot.png");
        std::fs::write(&original, b"x").unwrap();

        let outputs = vec![dir.path().join("shot_x.png")];
        assert_eq!(guess_original(&outputs, "_x"), Some(original));
        assert_eq!(guess_original(&outputs, ""), None);

        std::fs::write(&outputs[0], b"x").unwrap();
        assert_eq!(guess_original(&outputs, "_x"), Some(outputs[0].clone()));
    }
}
