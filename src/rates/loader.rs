//! Load rate schedules from disk
//!
//! Each financial year lives in its own directory:
//! - `parameters.json`: scalar parameters and thresholds
//! - `costs_of_children.csv`: bracket rows per age group and child count
//! - `care_bands.csv`: care-to-cost bands

use super::{CareBandRow, CareCostTable, CostRow, CostsOfChildrenTable, RateSchedule, ScheduleParameters};
use crate::error::RatesError;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const PARAMETERS_FILE: &str = "parameters.json";
pub const COSTS_FILE: &str = "costs_of_children.csv";
pub const CARE_BANDS_FILE: &str = "care_bands.csv";

/// Environment variable overriding the default rates directory
pub const RATES_DIR_ENV: &str = "CHILD_SUPPORT_RATES_DIR";
pub const DEFAULT_RATES_DIR: &str = "data/rates";

/// Rates directory from the environment, or the bundled default
pub fn default_rates_dir() -> PathBuf {
    std::env::var(RATES_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_RATES_DIR))
}

/// Load one year's schedule from its directory
pub fn load_schedule<P: AsRef<Path>>(dir: P) -> Result<RateSchedule, RatesError> {
    let dir = dir.as_ref();
    let parameters: ScheduleParameters = load_json(&dir.join(PARAMETERS_FILE))?;
    let cost_rows: Vec<CostRow> = load_csv(&dir.join(COSTS_FILE))?;
    let band_rows: Vec<CareBandRow> = load_csv(&dir.join(CARE_BANDS_FILE))?;

    let costs = CostsOfChildrenTable::from_loaded(&cost_rows)?;
    let care = CareCostTable::from_loaded(&band_rows, parameters.cost_percentage_ceiling)?;

    log::debug!(
        "Loaded {} schedule: {} cost rows, {} care bands",
        parameters.financial_year,
        cost_rows.len(),
        band_rows.len()
    );
    RateSchedule::new(parameters, costs, care)
}

/// Load every year directory under `root`, sorted by name
pub fn load_schedules<P: AsRef<Path>>(root: P) -> Result<Vec<RateSchedule>, RatesError> {
    let root = root.as_ref();
    let entries = std::fs::read_dir(root).map_err(|source| RatesError::Io {
        path: root.display().to_string(),
        source,
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RatesError::Io {
            path: root.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() && path.join(PARAMETERS_FILE).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut schedules = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let schedule = load_schedule(&dir)?;
        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Ok(year) = dir_name.parse::<u16>() {
            if year != schedule.year() {
                return Err(RatesError::Invalid(format!(
                    "{} declares financial year {}",
                    dir.display(),
                    schedule.year()
                )));
            }
        }
        schedules.push(schedule);
    }
    Ok(schedules)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, RatesError> {
    let file = File::open(path).map_err(|source| RatesError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| RatesError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RatesError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| RatesError::Csv {
            path: path.display().to_string(),
            source,
        })?;

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|source| RatesError::Csv {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BUNDLED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/rates");

    #[test]
    fn test_load_bundled_years() {
        let schedules = load_schedules(BUNDLED).unwrap();
        let years: Vec<u16> = schedules.iter().map(|s| s.year()).collect();
        assert_eq!(years, vec![2025, 2026]);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        match load_schedule(dir.path()) {
            Err(RatesError::Io { path, .. }) => assert!(path.ends_with(PARAMETERS_FILE)),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_directory_year_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("2030");
        fs::create_dir(&target).unwrap();
        for file in [PARAMETERS_FILE, COSTS_FILE, CARE_BANDS_FILE] {
            fs::copy(Path::new(BUNDLED).join("2026").join(file), target.join(file)).unwrap();
        }
        assert!(matches!(load_schedules(dir.path()), Err(RatesError::Invalid(_))));
    }

    #[test]
    fn test_malformed_band_csv() {
        let dir = tempfile::tempdir().unwrap();
        for file in [PARAMETERS_FILE, COSTS_FILE] {
            fs::copy(Path::new(BUNDLED).join("2026").join(file), dir.path().join(file)).unwrap();
        }
        fs::write(dir.path().join(CARE_BANDS_FILE), "care_from,care_to,rule,base,slope\n0,100,sideways,0,0\n").unwrap();
        assert!(matches!(load_schedule(dir.path()), Err(RatesError::Csv { .. })));
    }
}
