//! Load case snapshots from JSON files

use super::CaseSnapshot;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Load a single snapshot from a JSON file
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<CaseSnapshot, Box<dyn Error>> {
    let file = File::open(path.as_ref())?;
    let snapshot = serde_json::from_reader(BufReader::new(file))?;
    Ok(snapshot)
}

/// Load a batch of snapshots from a JSON file holding an array
pub fn load_snapshots<P: AsRef<Path>>(path: P) -> Result<Vec<CaseSnapshot>, Box<dyn Error>> {
    let file = File::open(path.as_ref())?;
    load_snapshots_from_reader(BufReader::new(file))
}

/// Load a batch from any reader; a lone object is accepted as a batch of one
pub fn load_snapshots_from_reader<R: Read>(reader: R) -> Result<Vec<CaseSnapshot>, Box<dyn Error>> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    let snapshots = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    log::debug!("Loaded {} case snapshots", snapshots.len());
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "case": {
            "id": "C-7",
            "parent_a": { "id": "A", "taxable_income": 60000 },
            "parent_b": { "id": "B", "taxable_income": 40000 },
            "children": [
                { "id": "k1", "date_of_birth": "2015-02-01", "care_nights": { "A": 100, "B": 265 } }
            ]
        },
        "period": { "start": "2026-01-01", "end": "2026-12-31" },
        "financial_year": 2026
    }"#;

    #[test]
    fn test_single_object_is_batch_of_one() {
        let batch = load_snapshots_from_reader(SNAPSHOT.as_bytes()).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].financial_year, Some(2026));
    }

    #[test]
    fn test_array_batch() {
        let json = format!("[{SNAPSHOT},{SNAPSHOT}]");
        let batch = load_snapshots_from_reader(json.as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_bundled_sample_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/cases/sample_cases.json");
        let batch = load_snapshots(path).unwrap();
        assert!(batch.len() >= 3);
    }
}
