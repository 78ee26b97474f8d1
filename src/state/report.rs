/// Report persistence
///
/// A report is one JSON object: the `params` key holds the run parameters and
/// every other key is a row identity mapping column names to cell values.
/// Files whose name ends in `.gz` are gzip compressed.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::data::CellValue;
use super::params::Params;
use crate::error::{ImcompError, Result};

pub const PARAMS_KEY: &str = "params";

/// Column name -> value for one row
pub type ReportRow = IndexMap<String, CellValue>;

/// Persisted snapshot of a comparison table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub params: Params,
    pub rows: IndexMap<String, ReportRow>,
}

impl Report {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            rows: IndexMap::new(),
        }
    }

    fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(PARAMS_KEY.to_string(), Value::Object(self.params.0.clone()));
        for (identity, row) in &self.rows {
            if identity == PARAMS_KEY {
                warn!("row '{}' clashes with the parameters key and is not saved", identity);
                continue;
            }
            let cells: Map<String, Value> = row
                .iter()
                .map(|(column, cell)| {
                    let value = match cell {
                        CellValue::Integer(i) => Value::from(*i),
                        CellValue::Float(f) if f.is_finite() => Value::from(*f),
                        // JSON has no NaN or infinity
                        CellValue::Float(f) => Value::from(f.to_string()),
                        CellValue::Text(text) => Value::from(text.as_str()),
                    };
                    (column.clone(), value)
                })
                .collect();
            object.insert(identity.clone(), Value::Object(cells));
        }
        Value::Object(object)
    }

    fn from_value(value: Value, origin: &Path) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(ImcompError::report_parse(origin, "top level is not an object"));
        };

        let mut report = Report::default();
        for (key, value) in object {
            if key == PARAMS_KEY {
                match value {
                    Value::Object(params) => report.params = Params(params),
                    _ => return Err(ImcompError::report_parse(origin, "params is not an object")),
                }
                continue;
            }

            let Value::Object(cells) = value else {
                return Err(ImcompError::report_parse(
                    origin,
                    format!("row '{}' is not an object", key),
                ));
            };
            let row = cells
                .into_iter()
                .map(|(column, cell)| {
                    serde_json::from_value::<CellValue>(cell)
                        .map(|cell| (column.clone(), cell))
                        .map_err(|_| {
                            ImcompError::report_parse(
                                origin,
                                format!("row '{}' column '{}' is not a string or number", key, column),
                            )
                        })
                })
                .collect::<Result<ReportRow>>()?;
            report.rows.insert(key, row);
        }
        Ok(report)
    }
}

/// True when the file name carries the compression marker
pub fn is_compressed_name(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("gz"))
}

/// Encode a report as UTF-8 JSON, gzip compressed if asked
pub fn serialize(report: &Report, compress: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(&report.to_value())?;
    if !compress {
        return Ok(json);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decode bytes produced by [`serialize`]
pub fn deserialize(bytes: &[u8], compressed: bool) -> Result<Report> {
    decode(bytes, compressed, Path::new("<memory>"))
}

fn decode(bytes: &[u8], compressed: bool, origin: &Path) -> Result<Report> {
    let text = if compressed {
        let mut text = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut text)
            .map_err(|e| ImcompError::report_parse(origin, e))?;
        text
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|e| ImcompError::report_parse(origin, e))?
    };

    let value: Value = serde_json::from_str(&text).map_err(|e| ImcompError::report_parse(origin, e))?;
    Report::from_value(value, origin)
}

/// Where a report will actually be written: `.json` targets gain `.gz` when compressing
pub fn target_path(path: &Path, compress: bool) -> PathBuf {
    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if compress && is_json {
        let mut name = path.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        path.to_path_buf()
    }
}

/// Write a report, keeping the previous file as `<name>.bak`.
///
/// Names ending in `.gz` are always compressed. Returns the written path.
pub fn write_report(report: &Report, path: &Path, compress: bool) -> Result<PathBuf> {
    let target = target_path(path, compress);
    let compress = compress || is_compressed_name(&target);
    let bytes = serialize(report, compress)?;

    if target.is_file() {
        let mut backup = target.as_os_str().to_os_string();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        if backup.is_file() {
            fs::remove_file(&backup)?;
        }
        fs::rename(&target, &backup)?;
        debug!("previous report kept as {}", backup.display());
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, bytes)?;
    info!("report with {} rows written to {}", report.rows.len(), target.display());
    Ok(target)
}

/// Read a report, decompressing when the name ends in `.gz`
pub fn read_report(path: &Path) -> Result<Report> {
    let bytes = fs::read(path)?;
    let report = decode(&bytes, is_compressed_name(path), path)?;
    debug!("report {} holds {} rows", path.display(), report.rows.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Report {
        let mut params = Params::new();
        params.set("filters", "city");
        params.set("recursive", true);
        params.set("image_sets", json!([{"directory": "/a", "suffix": "_x"}]));

        let mut report = Report::new(params);
        let mut row = ReportRow::new();
        row.insert("out_set0".into(), CellValue::from("/a/img_x.png"));
        row.insert("count".into(), CellValue::Integer(12));
        row.insert("out_set0-out_set1".into(), CellValue::Float(3.25));
        row.insert("note".into(), CellValue::from("42"));
        report.rows.insert("img".into(), row);
        report.rows.insert("empty".into(), ReportRow::new());
        report
    }

    #[test]
    fn test_round_trip_plain() {
        let report = sample();
        let bytes = serialize(&report, false).unwrap();
        assert_eq!(deserialize(&bytes, false).unwrap(), report);
    }

    #[test]
    fn test_round_trip_compressed() {
        let report = sample();
        let bytes = serialize(&report, true).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(deserialize(&bytes, true).unwrap(), report);
    }

    #[test]
    fn test_round_trip_no_rows() {
        let report = Report::default();
        let bytes = serialize(&report, false).unwrap();
        assert_eq!(bytes, br#"{"params":{}}"#);
        assert_eq!(deserialize(&bytes, false).unwrap(), report);
    }

    #[test]
    fn test_text_numbers_stay_text() {
        let bytes = serialize(&sample(), false).unwrap();
        let restored = deserialize(&bytes, false).unwrap();
        assert_eq!(restored.rows["img"]["note"], CellValue::from("42"));
    }

    #[test]
    fn test_non_finite_floats_are_saved_as_text() {
        let mut report = Report::default();
        let mut row = ReportRow::new();
        row.insert("a-b".into(), CellValue::Float(f64::NAN));
        row.insert("b-c".into(), CellValue::Float(f64::INFINITY));
        report.rows.insert("img".into(), row);

        let bytes = serialize(&report, false).unwrap();
        let restored = deserialize(&bytes, false).unwrap();
        assert_eq!(restored.rows["img"]["a-b"], CellValue::from("NaN"));
        assert_eq!(restored.rows["img"]["b-c"], CellValue::from("inf"));
    }

    #[test]
    fn test_row_named_params_keeps_parameters() {
        let mut report = sample();
        let mut row = ReportRow::new();
        row.insert("out_set0".into(), CellValue::from("/a/params_x.png"));
        report.rows.insert(PARAMS_KEY.into(), row);

        let restored = deserialize(&serialize(&report, false).unwrap(), false).unwrap();
        assert_eq!(restored, sample());
        assert_eq!(restored.params.str("filters"), "city");
    }

    #[test]
    fn test_malformed_reports() {
        assert!(matches!(deserialize(b"[1, 2]", false), Err(ImcompError::ReportParse { .. })));
        assert!(matches!(deserialize(b"{ broken", false), Err(ImcompError::ReportParse { .. })));
        assert!(matches!(
            deserialize(br#"{"row": {"col": {"nested": 1}}}"#, false),
            Err(ImcompError::ReportParse { .. })
        ));
        assert!(matches!(deserialize(b"plain", true), Err(ImcompError::ReportParse { .. })));
    }

    #[test]
    fn test_compress_flag_appends_marker() {
        assert_eq!(target_path(Path::new("r.json"), true), PathBuf::from("r.json.gz"));
        assert_eq!(target_path(Path::new("r.json"), false), PathBuf::from("r.json"));
        assert_eq!(target_path(Path::new("r.json.gz"), false), PathBuf::from("r.json.gz"));
    }

    #[test]
    fn test_write_read_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample();

        let written = write_report(&report, &path, false).unwrap();
        assert_eq!(written, path);
        write_report(&Report::default(), &path, false).unwrap();

        assert_eq!(read_report(&path).unwrap(), Report::default());
        assert_eq!(read_report(&dir.path().join("report.json.bak")).unwrap(), report);
    }

    #[test]
    fn test_gz_name_is_read_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_report(&sample(), &dir.path().join("report.json"), true).unwrap();
        assert!(is_compressed_name(&written));
        assert_eq!(read_report(&written).unwrap(), sample());

        // A .gz name is compressed even without the flag
        let forced = write_report(&sample(), &dir.path().join("other.json.gz"), false).unwrap();
        assert_eq!(read_report(&forced).unwrap(), sample());
    }
}
