/// Set aligner: strict intersection of N set listings

use indexmap::IndexMap;
use std::path::PathBuf;

use super::scanner::ScanOutput;

/// Identity -> one path per image set, ordered like the first set's listing
pub type AlignedRows = IndexMap<String, Vec<PathBuf>>;

/// Keep the identities present in every scan, in first-scan discovery order.
///
/// The row order of the comparison table comes from here. Zero scans give an
/// empty result.
pub fn align(scans: &[ScanOutput]) -> AlignedRows {
    let Some((first, rest)) = scans.split_first() else {
        return AlignedRows::new();
    };

    first
        .entries
        .iter()
        .filter(|(identity, _)| rest.iter().all(|scan| scan.contains(identity)))
        .map(|(identity, path)| {
            let mut paths = Vec::with_capacity(scans.len());
            paths.push(path.clone());
            paths.extend(rest.iter().filter_map(|scan| scan.get(identity).cloned()));
            (identity.clone(), paths)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(set: &str, ids: &[&str]) -> ScanOutput {
        ScanOutput {
            entries: ids
                .iter()
                .map(|id| (id.to_string(), PathBuf::from(format!("/{}/{}.png", set, id))))
                .collect(),
            collisions: 0,
        }
    }

    #[test]
    fn test_intersection_in_first_order() {
        let a = listing("a", &["z", "m", "b", "q"]);
        let b = listing("b", &["b", "q", "z", "x"]);
        let c = listing("c", &["q", "z", "b"]);

        let rows = align(&[a, b, c]);
        let ids: Vec<&String> = rows.keys().collect();
        assert_eq!(ids, vec!["z", "b", "q"]);

        assert_eq!(
            rows["b"],
            vec![
                PathBuf::from("/a/b.png"),
                PathBuf::from("/b/b.png"),
                PathBuf::from("/c/b.png")
            ]
        );
    }

    #[test]
    fn test_single_set_passes_through() {
        let rows = align(&[listing("a", &["one", "two"])]);
        assert_eq!(rows.len(), 2);
        assert!(rows.values().all(|paths| paths.len() == 1));
    }

    #[test]
    fn test_no_common_identity() {
        let rows = align(&[listing("a", &["x"]), listing("b", &["y"])]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_zero_scans() {
        assert!(align(&[]).is_empty());
    }
}
