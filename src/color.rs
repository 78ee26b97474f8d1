/// Column statistics and value-to-color mapping
///
/// Numeric columns hold values on unrelated scales (pixel differences, counts,
/// timings). Each column keeps a running min/max; a value is placed on a 0..=255
/// index inside its column range, and the index picks a color on a jet ramp.
/// Colors are presentation data only and never reach the report.

use std::collections::{BTreeMap, HashMap};

use crate::state::data::CellValue;

/// Alpha applied to cell backgrounds
pub const BACKGROUND_OPACITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

/// Running min/max per column index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnStats {
    ranges: BTreeMap<usize, Range>,
}

impl ColumnStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen the column range with a numeric value; text is ignored
    pub fn observe(&mut self, column: usize, value: &CellValue) {
        let Some(v) = value.as_f64() else {
            return;
        };
        self.ranges
            .entry(column)
            .and_modify(|range| {
                range.min = range.min.min(v);
                range.max = range.max.max(v);
            })
            .or_insert(Range { min: v, max: v });
    }

    pub fn range(&self, column: usize) -> Option<Range> {
        self.ranges.get(&column).copied()
    }

    /// Forget everything; only done when the table is rebuilt
    pub fn reset(&mut self) {
        self.ranges.clear();
    }

    /// Color index of `value` in its column, `None` for text, unseen columns
    /// and constant columns
    pub fn color_for(&self, column: usize, value: &CellValue) -> Option<u8> {
        let range = self.range(column)?;
        color_index(range, value.as_f64()?)
    }
}

/// `(value - min) / (max - min) * 255`, clamped; `None` when `min == max`
pub fn color_index(range: Range, value: f64) -> Option<u8> {
    if range.max == range.min {
        return None;
    }
    let t = (value - range.min) / (range.max - range.min);
    Some((t * 255.0).clamp(0.0, 255.0) as u8)
}

/// Jet ramp (blue, cyan, yellow, red) as RGBA
pub fn jet(index: u8) -> [u8; 4] {
    let x = index as f32 / 255.0;
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    [channel(3.0), channel(2.0), channel(1.0), BACKGROUND_OPACITY]
}

/// Background color of each colored cell, keyed by (row identity, column)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellColors {
    colors: HashMap<(String, usize), [u8; 4]>,
}

impl CellColors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &str, column: usize) -> Option<[u8; 4]> {
        self.colors.get(&(identity.to_string(), column)).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn clear(&mut self) {
        self.colors.clear();
    }

    /// Recompute one column from scratch.
    ///
    /// Earlier colors of the column are dropped first, so the result only
    /// depends on the current stats and values.
    pub fn recolor_column<'a, I>(&mut self, stats: &ColumnStats, column: usize, cells: I)
    where
        I: IntoIterator<Item = (&'a str, &'a CellValue)>,
    {
        self.colors.retain(|(_, c), _| *c != column);
        for (identity, value) in cells {
            if let Some(index) = stats.color_for(column, value) {
                self.colors.insert((identity.to_string(), column), jet(index));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_widens_monotonically() {
        let mut stats = ColumnStats::new();
        stats.observe(2, &CellValue::Float(5.0));
        assert_eq!(stats.range(2), Some(Range { min: 5.0, max: 5.0 }));

        stats.observe(2, &CellValue::Integer(1));
        stats.observe(2, &CellValue::Float(9.5));
        stats.observe(2, &CellValue::Float(3.0));
        stats.observe(2, &CellValue::from("not a number"));
        assert_eq!(stats.range(2), Some(Range { min: 1.0, max: 9.5 }));
        assert_eq!(stats.range(3), None);
    }

    #[test]
    fn test_midpoint_maps_to_127() {
        let mut stats = ColumnStats::new();
        stats.observe(0, &CellValue::Integer(0));
        stats.observe(0, &CellValue::Integer(10));

        let index = stats.color_for(0, &CellValue::Integer(5)).unwrap();
        assert!((126..=128).contains(&index));
        assert_eq!(stats.color_for(0, &CellValue::Integer(0)), Some(0));
        assert_eq!(stats.color_for(0, &CellValue::Integer(10)), Some(255));
    }

    #[test]
    fn test_constant_column_is_uncolored() {
        let mut stats = ColumnStats::new();
        stats.observe(1, &CellValue::Float(4.0));
        stats.observe(1, &CellValue::Float(4.0));
        assert_eq!(stats.color_for(1, &CellValue::Float(4.0)), None);
        assert_eq!(stats.color_for(1, &CellValue::Float(7.0)), None);
    }

    #[test]
    fn test_jet_ends() {
        assert_eq!(jet(0), [0, 0, 128, BACKGROUND_OPACITY]);
        assert_eq!(jet(255), [128, 0, 0, BACKGROUND_OPACITY]);
        let mid = jet(128);
        assert!(mid[1] > 200);
    }

    #[test]
    fn test_recolor_is_idempotent() {
        let mut stats = ColumnStats::new();
        let values = [
            ("a".to_string(), CellValue::Float(0.0)),
            ("b".to_string(), CellValue::Float(2.0)),
            ("c".to_string(), CellValue::from("n/a")),
        ];
        for (_, v) in &values {
            stats.observe(3, v);
        }

        let cells = || values.iter().map(|(id, v)| (id.as_str(), v));
        let mut colors = CellColors::new();
        colors.recolor_column(&stats, 3, cells());
        let first = colors.clone();
        colors.recolor_column(&stats, 3, cells());
        assert_eq!(colors, first);
        assert_eq!(colors.len(), 2);
        assert!(colors.get("c", 3).is_none());

        // A wider range shifts earlier colors
        stats.observe(3, &CellValue::Float(4.0));
        colors.recolor_column(&stats, 3, cells());
        assert_ne!(colors.get("b", 3), first.get("b", 3));
    }
}
