//! Unit handling for emission fields.
//!
//! The inversion setup emits a fixed total mass per level over one emission
//! timestep, so the raw fields are in teragrams per cell. Converting to a
//! mass flux in kg/(m*s) divides each cell by its level thickness and the
//! timestep length, which is only well defined when the emission times are
//! uniformly spaced.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use ndarray::Array1;

use crate::field::MaskedField;
use crate::AshError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MassUnit {
    /// Total teragrams per (level, timestep) cell.
    Tg,
    /// Mass flux in kg per metre of column per second.
    KgPerMeterSecond,
}

impl MassUnit {
    pub fn label(&self) -> &'static str {
        match self {
            MassUnit::Tg => "tg",
            MassUnit::KgPerMeterSecond => "kg/(m*s)",
        }
    }
}

impl FromStr for MassUnit {
    type Err = AshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tg" => Ok(MassUnit::Tg),
            "kg/(m*s)" | "kg/m/s" => Ok(MassUnit::KgPerMeterSecond),
            other => Err(AshError::InvalidUnit(other.to_string())),
        }
    }
}

/// The single emission timestep in seconds, failing if the intervals differ.
pub fn uniform_step_seconds(times: &[DateTime<Utc>]) -> Result<f64, AshError> {
    if times.len() < 2 {
        return Err(AshError::Record(
            "need at least two emission times to derive a timestep".into(),
        ));
    }
    let step = (times[1] - times[0]).num_milliseconds() as f64 / 1000.0;
    for pair in times.windows(2) {
        let delta = (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
        if (delta - step).abs() > 1e-9 {
            return Err(AshError::NonUniformSampling);
        }
    }
    Ok(step)
}

/// Convert a field from tg per cell to kg/(m*s), given the level thicknesses
/// (metres) and the uniform timestep (seconds).
pub fn to_mass_flux(
    field: &MaskedField,
    level_heights: &Array1<f64>,
    step_seconds: f64,
) -> Result<MaskedField, AshError> {
    let (rows, _) = field.dim();
    if level_heights.len() != rows {
        return Err(AshError::ShapeMismatch(format!(
            "{} level heights for a field with {} rows",
            level_heights.len(),
            rows
        )));
    }
    Ok(field.map(|a, _, v| v / (level_heights[a] * step_seconds) * 1.0e9))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::{array, Array2};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 1, 6, minute, 0).unwrap()
    }

    #[test]
    fn uniform_step_is_accepted() {
        let times = [t(0), t(15), t(30), t(45)];
        assert_eq!(uniform_step_seconds(&times).unwrap(), 900.0);
    }

    #[test]
    fn non_uniform_step_is_rejected() {
        let times = [t(0), t(15), t(35)];
        assert!(matches!(
            uniform_step_seconds(&times),
            Err(AshError::NonUniformSampling)
        ));
    }

    #[test]
    fn flux_conversion_scales_by_height_and_step() {
        let field = MaskedField::from_parts(
            array![[2.0, 4.0]],
            Array2::from_elem((1, 2), true),
        );
        let heights = array![1000.0];
        let flux = to_mass_flux(&field, &heights, 100.0).unwrap();
        // 2 tg / (1000 m * 100 s) * 1e9 = 2e4 kg/(m*s)
        assert_eq!(flux.get(0, 0), Some(20_000.0));
        assert_eq!(flux.get(0, 1), Some(40_000.0));
    }

    #[test]
    fn unit_parsing() {
        assert_eq!("tg".parse::<MassUnit>().unwrap(), MassUnit::Tg);
        assert_eq!(
            "kg/(m*s)".parse::<MassUnit>().unwrap(),
            MassUnit::KgPerMeterSecond
        );
        assert!(matches!(
            "lbs".parse::<MassUnit>(),
            Err(AshError::InvalidUnit(_))
        ));
    }
}
