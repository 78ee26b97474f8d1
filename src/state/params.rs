/// Run parameters stored under the `params` key of a report
///
/// Parameters are a free-form JSON object so that reports written by older or
/// newer versions keep every key they carry. Typed accessors cover the keys
/// this crate reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::data::ImageSet;

/// Key naming the report file itself; never taken from a loaded report
pub const REPORT_KEY: &str = "report";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String value, empty when missing or not a string
    pub fn str(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// List of strings; a single string is split on commas
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => s.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Comma separated name filters
    pub fn filters(&self) -> Vec<String> {
        self.list("filters")
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect()
    }

    pub fn extensions(&self) -> Vec<String> {
        let ext = self.list("ext");
        if ext.is_empty() {
            vec![".jpg".to_string(), ".png".to_string()]
        } else {
            ext
        }
    }

    /// Subdirectories are walked unless `recursive` is false
    pub fn recursive(&self) -> bool {
        self.0.get("recursive").and_then(Value::as_bool).unwrap_or(true)
    }

    pub fn report_path(&self) -> Option<PathBuf> {
        let report = self.str(REPORT_KEY);
        (!report.is_empty()).then(|| PathBuf::from(report))
    }

    /// Image sets, if the key exists and decodes
    pub fn image_sets(&self) -> Option<Vec<ImageSet>> {
        let value = self.0.get("image_sets")?;
        match serde_json::from_value(value.clone()) {
            Ok(sets) => Some(sets),
            Err(e) => {
                warn!("ignoring malformed image_sets: {}", e);
                None
            }
        }
    }

    pub fn set_image_sets(&mut self, sets: &[ImageSet]) {
        // ImageSet only holds strings and paths
        let value = serde_json::to_value(sets).unwrap_or(Value::Array(Vec::new()));
        self.0.insert("image_sets".to_string(), value);
    }
}

/// Combine the current parameters with the ones of a loaded report.
///
/// A loaded key replaces the current value unless the key was given
/// explicitly on this invocation or names the report file itself.
pub fn merge_loaded_params(existing: &Params, loaded: &Params, explicit: &HashSet<String>) -> Params {
    let mut merged = existing.clone();
    for (key, value) in &loaded.0 {
        if key == REPORT_KEY || explicit.contains(key) {
            continue;
        }
        merged.0.insert(key.clone(), value.clone());
    }
    merged
}

/// Build the image-set list when the parameters do not already carry one.
///
/// `sets` entries (`name:dir:suffix`) win; otherwise directories and suffixes
/// are paired up, the shorter list repeating its last element. Legacy keys
/// `first_directory`/`second_directory` and `suffix1`/`suffix2` fill in for
/// missing lists.
pub fn resolve_image_sets(params: &Params) -> Vec<ImageSet> {
    let root_dir = params.str("root_dir").to_string();
    let rooted = |dir: &str| -> PathBuf {
        if root_dir.is_empty() {
            PathBuf::from(dir)
        } else {
            Path::new(&root_dir).join(dir)
        }
    };

    let declared = params.list("sets");
    if !declared.is_empty() {
        return declared
            .iter()
            .filter_map(|desc| {
                let mut parts = desc.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(name), Some(dir), Some(suffix)) => Some(ImageSet::named(name, rooted(dir), suffix)),
                    _ => {
                        warn!("ignoring set '{}', expected name:dir:suffix", desc);
                        None
                    }
                }
            })
            .collect();
    }

    let mut directories = params.list("directory_list");
    if directories.is_empty() {
        directories = ["first_directory", "second_directory"]
            .iter()
            .map(|key| params.str(key))
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut suffixes = params.list("suffix_list");
    if suffixes.is_empty() {
        suffixes = ["suffix1", "suffix2"]
            .iter()
            .filter(|key| params.contains(key))
            .map(|key| params.str(key).to_string())
            .collect();
    }
    if suffixes.is_empty() {
        suffixes.push(String::new());
    }

    if directories.is_empty() {
        return Vec::new();
    }

    let size = directories.len().max(suffixes.len());
    (0..size)
        .map(|n| {
            let dir = &directories[n.min(directories.len() - 1)];
            let suffix = &suffixes[n.min(suffixes.len() - 1)];
            ImageSet::new(rooted(dir), suffix.clone())
        })
        .collect()
}

/// Expand shell patterns (`*`, `?`) in a directory list; entries that match
/// nothing are kept as given.
pub fn expand_directories(patterns: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for pattern in patterns {
        let matches: Vec<String> = match glob::glob(pattern) {
            Ok(paths) => paths
                .filter_map(|p| p.ok())
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
            Err(e) => {
                warn!("invalid directory pattern '{}': {}", pattern, e);
                Vec::new()
            }
        };
        if matches.is_empty() {
            expanded.push(pattern.clone());
        } else {
            expanded.extend(matches);
        }
    }
    expanded
}

/// Retry set directories that do not exist relative to `search_path`
pub fn locate_directories(sets: &mut [ImageSet], search_path: &Path) {
    for set in sets.iter_mut() {
        if set.directory.is_dir() {
            debug!("path {} checked", set.directory.display());
            continue;
        }
        let relative = search_path.join(&set.directory);
        if relative.is_dir() {
            info!("found path {}", relative.display());
            set.directory = relative;
        } else {
            warn!(
                "path {} or {} not found",
                set.directory.display(),
                relative.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_recursive_unless_disabled() {
        assert!(params(json!({})).recursive());
        assert!(params(json!({"recursive": true})).recursive());
        assert!(!params(json!({"recursive": false})).recursive());
    }

    #[test]
    fn test_loaded_value_fills_current() {
        let current = params(json!({"filters": ""}));
        let loaded = params(json!({"filters": "x"}));
        let merged = merge_loaded_params(&current, &loaded, &HashSet::new());
        assert_eq!(merged.str("filters"), "x");
    }

    #[test]
    fn test_explicit_override_wins() {
        let current = params(json!({"filters": ""}));
        let loaded = params(json!({"filters": "x"}));
        let explicit: HashSet<String> = ["filters".to_string()].into();
        let merged = merge_loaded_params(&current, &loaded, &explicit);
        assert_eq!(merged.str("filters"), "");
    }

    #[test]
    fn test_report_key_is_never_replaced() {
        let current = params(json!({"report": "new.json"}));
        let loaded = params(json!({"report": "old.json", "recursive": true}));
        let merged = merge_loaded_params(&current, &loaded, &HashSet::new());
        assert_eq!(merged.str("report"), "new.json");
        assert!(merged.recursive());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let current = params(json!({"a": 1, "b": 2}));
        let loaded = params(json!({"b": 3, "c": 4}));
        let explicit: HashSet<String> = ["a".to_string()].into();
        let merged = merge_loaded_params(&current, &loaded, &explicit);
        assert_eq!(merged, params(json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn test_named_sets() {
        let p = params(json!({"sets": ["ref:base:_ref", "new:base:_new"], "root_dir": "/data"}));
        let sets = resolve_image_sets(&p);
        assert_eq!(
            sets,
            vec![
                ImageSet::named("ref", "/data/base", "_ref"),
                ImageSet::named("new", "/data/base", "_new"),
            ]
        );
    }

    #[test]
    fn test_single_directory_two_suffixes() {
        let p = params(json!({"directory_list": ["/out"], "suffix_list": "_a,_b"}));
        let sets = resolve_image_sets(&p);
        assert_eq!(sets, vec![ImageSet::new("/out", "_a"), ImageSet::new("/out", "_b")]);
    }

    #[test]
    fn test_legacy_keys() {
        let p = params(json!({
            "first_directory": "/one",
            "second_directory": "/two",
            "suffix1": "_x",
            "suffix2": "_y"
        }));
        let sets = resolve_image_sets(&p);
        assert_eq!(sets, vec![ImageSet::new("/one", "_x"), ImageSet::new("/two", "_y")]);
    }

    #[test]
    fn test_no_directories() {
        assert!(resolve_image_sets(&Params::new()).is_empty());
    }

    #[test]
    fn test_image_sets_round_trip() {
        let mut p = Params::new();
        let sets = vec![ImageSet::new("/a", "_1"), ImageSet::named("b", "/b", "")];
        p.set_image_sets(&sets);
        assert_eq!(p.image_sets(), Some(sets));
    }

    #[test]
    fn test_locate_relative_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run")).unwrap();
        let mut sets = vec![ImageSet::new("run", "")];
        locate_directories(&mut sets, dir.path());
        assert_eq!(sets[0].directory, dir.path().join("run"));
    }

    #[test]
    fn test_expand_keeps_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run_1")).unwrap();
        std::fs::create_dir(dir.path().join("run_2")).unwrap();

        let pattern = format!("{}/run_*", dir.path().display());
        let expanded = expand_directories(&[pattern, "missing".to_string()]);
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[2], "missing");
    }
}
