//! Core volcanic-ash inversion reconstruction library implemented in Rust.
//!
//! An inversion run produces a flat list of emission values (one a-priori,
//! one a-posteriori) plus an ordering index table mapping each
//! (elevation, time) cell to its slot in those lists. This crate rebuilds
//! the dense 2D fields, prunes them to a shared bounding box, converts
//! units, and rebins oversized matrices for rendering. All rendering lives
//! in the CLI.

pub mod downsample;
pub mod field;
pub mod units;

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use thiserror::Error;

use field::{expand, prune_bounds, MaskedField, PruneBounds};

#[derive(Error, Debug)]
pub enum AshError {
    #[error("ordering index {index} out of range for {len} emission values")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("inconsistent shapes: {0}")]
    ShapeMismatch(String),
    #[error("no data above prune threshold")]
    NoDataAboveThreshold,
    #[error("unknown aggregator: {0}")]
    InvalidAggregator(String),
    #[error("unknown unit: {0}")]
    InvalidUnit(String),
    #[error("non-uniform sampling: emission timesteps differ")]
    NonUniformSampling,
    #[error("malformed inversion record: {0}")]
    Record(String),
    #[error("failed to read inversion record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse inversion record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw inversion result record as written by the solver.
#[derive(Clone, Debug, Deserialize)]
pub struct InversionRecord {
    pub emission_times: Vec<String>,
    pub level_heights: Vec<f64>,
    pub volcano_altitude: f64,
    pub ordering_index: Vec<Vec<i64>>,
    pub a_priori_2d: Vec<f64>,
    pub a_posteriori_2d: Vec<f64>,
    #[serde(default)]
    pub residual: Vec<f64>,
    #[serde(default)]
    pub convergence: Vec<f64>,
    #[serde(default)]
    pub run_date: Option<String>,
}

/// Reconstructed and (optionally) pruned inversion, ready for rendering.
#[derive(Clone, Debug)]
pub struct Inversion {
    pub emission_times: Vec<DateTime<Utc>>,
    pub level_heights: Array1<f64>,
    pub volcano_altitude: f64,
    pub a_priori: MaskedField,
    pub a_posteriori: MaskedField,
    pub residual: Array1<f64>,
    pub convergence: Array1<f64>,
    pub run_date: Option<DateTime<Utc>>,
}

/// Controls for reconstruction and pruning.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub prune: bool,
    pub prune_zero: f64,
    pub valid_times_min: Option<usize>,
    pub valid_times_max: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            prune: true,
            prune_zero: 0.0,
            valid_times_min: None,
            valid_times_max: None,
        }
    }
}

/// Read an inversion record from a JSON file and reconstruct it.
pub fn load_inversion(path: &Path, options: &LoadOptions) -> Result<Inversion, AshError> {
    let text = std::fs::read_to_string(path)?;
    let record: InversionRecord = serde_json::from_str(&text)?;
    build_inversion(&record, options)
}

/// Expand both emission-value arrays through the ordering index and prune
/// the two fields to their shared bounding box.
pub fn build_inversion(
    record: &InversionRecord,
    options: &LoadOptions,
) -> Result<Inversion, AshError> {
    let ordering_index = ordering_index_matrix(record)?;
    let a_priori = expand(&ordering_index, &record.a_priori_2d)?;
    let a_posteriori = expand(&ordering_index, &record.a_posteriori_2d)?;

    let mut emission_times = Vec::with_capacity(record.emission_times.len());
    for raw in &record.emission_times {
        emission_times.push(parse_time(raw)?);
    }
    let run_date = record.run_date.as_deref().map(parse_time).transpose()?;
    let level_heights = Array1::from_vec(record.level_heights.clone());

    let (a_priori, a_posteriori, emission_times, level_heights) = if options.prune {
        let bounds = prune_bounds(
            &a_priori,
            &a_posteriori,
            options.prune_zero,
            options.valid_times_min,
            options.valid_times_max,
        )?;
        let times = emission_times[bounds.times.clone()].to_vec();
        let heights = level_heights
            .slice(ndarray::s![bounds.levels.clone()])
            .to_owned();
        (
            a_priori.crop(&bounds),
            a_posteriori.crop(&bounds),
            times,
            heights,
        )
    } else {
        (a_priori, a_posteriori, emission_times, level_heights)
    };

    Ok(Inversion {
        emission_times,
        level_heights,
        volcano_altitude: record.volcano_altitude,
        a_priori,
        a_posteriori,
        residual: Array1::from_vec(record.residual.clone()),
        convergence: Array1::from_vec(record.convergence.clone()),
        run_date,
    })
}

/// Compute the prune box for an already-reconstructed pair of fields.
pub fn shared_prune_bounds(
    inversion: &Inversion,
    threshold: f64,
    time_min: Option<usize>,
    time_max: Option<usize>,
) -> Result<PruneBounds, AshError> {
    prune_bounds(
        &inversion.a_priori,
        &inversion.a_posteriori,
        threshold,
        time_min,
        time_max,
    )
}

fn ordering_index_matrix(record: &InversionRecord) -> Result<Array2<i64>, AshError> {
    let rows = record.ordering_index.len();
    let cols = record
        .ordering_index
        .first()
        .map(Vec::len)
        .unwrap_or_default();
    if rows != record.level_heights.len() || cols != record.emission_times.len() {
        return Err(AshError::ShapeMismatch(format!(
            "ordering index is {}x{} but record has {} levels and {} timesteps",
            rows,
            cols,
            record.level_heights.len(),
            record.emission_times.len()
        )));
    }
    let mut flat = Vec::with_capacity(rows * cols);
    for row in &record.ordering_index {
        if row.len() != cols {
            return Err(AshError::ShapeMismatch(
                "ragged ordering index rows".into(),
            ));
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows, cols), flat)
        .map_err(|e| AshError::ShapeMismatch(e.to_string()))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, AshError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    // Solver output sometimes carries naive ISO timestamps; treat as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(AshError::Record(format!("bad timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> InversionRecord {
        InversionRecord {
            emission_times: vec![
                "2019-04-01T00:00:00".into(),
                "2019-04-01T03:00:00".into(),
                "2019-04-01T06:00:00".into(),
            ],
            level_heights: vec![500.0, 500.0, 1000.0],
            volcano_altitude: 1666.0,
            ordering_index: vec![vec![0, 1, -1], vec![2, 3, -1], vec![-1, -1, -1]],
            a_priori_2d: vec![1.0, 1.0, 1.0, 1.0],
            a_posteriori_2d: vec![0.5, 2.0, 0.0, 1.5],
            residual: vec![10.0, 4.0, 2.5],
            convergence: vec![100.0, 20.0, 5.0],
            run_date: Some("2019-05-01T12:00:00".into()),
        }
    }

    #[test]
    fn build_prunes_both_fields_to_shared_box() {
        let inversion = build_inversion(&sample_record(), &LoadOptions::default()).unwrap();
        // Top level and last timestep carry no data in either field.
        assert_eq!(inversion.a_priori.dim(), (2, 2));
        assert_eq!(inversion.a_posteriori.dim(), (2, 2));
        assert_eq!(inversion.emission_times.len(), 2);
        assert_eq!(inversion.level_heights.len(), 2);
        assert_eq!(inversion.a_posteriori.get(0, 1), Some(2.0));
        assert_eq!(inversion.a_posteriori.get(1, 1), Some(1.5));
    }

    #[test]
    fn build_without_pruning_keeps_full_grid() {
        let options = LoadOptions {
            prune: false,
            ..LoadOptions::default()
        };
        let inversion = build_inversion(&sample_record(), &options).unwrap();
        assert_eq!(inversion.a_priori.dim(), (3, 3));
        assert_eq!(inversion.emission_times.len(), 3);
        assert_eq!(inversion.a_priori.get(2, 0), None);
    }

    #[test]
    fn build_rejects_mismatched_index_shape() {
        let mut record = sample_record();
        record.level_heights.pop();
        assert!(matches!(
            build_inversion(&record, &LoadOptions::default()),
            Err(AshError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn build_rejects_index_beyond_values() {
        let mut record = sample_record();
        record.ordering_index[0][0] = 9;
        assert!(matches!(
            build_inversion(&record, &LoadOptions::default()),
            Err(AshError::IndexOutOfRange { index: 9, len: 4 })
        ));
    }

    #[test]
    fn timestamps_parse_with_and_without_zone() {
        assert!(parse_time("2019-04-01T00:00:00Z").is_ok());
        assert!(parse_time("2019-04-01T00:00:00").is_ok());
        assert!(parse_time("yesterday").is_err());
    }
}
