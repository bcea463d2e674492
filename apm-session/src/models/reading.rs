//! Sensor readings submitted for classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reading validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ReadingError {
    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    #[error("Value for {0} is not a finite number")]
    NonFinite(&'static str),

    #[error("SpO2 must be between 0 and 100, got {0}")]
    Spo2OutOfRange(f64),
}

/// EEG band powers
///
/// A band is `None` when the source did not report a finite value for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EegReading {
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

impl EegReading {
    /// Band names in canonical (positional) order
    pub const BANDS: [&'static str; 5] = ["delta", "theta", "alpha", "beta", "gamma"];

    /// Build from values in `BANDS` order
    pub fn from_bands(values: [Option<f64>; 5]) -> Self {
        let [delta, theta, alpha, beta, gamma] = values.map(|v| v.filter(|x| x.is_finite()));
        Self {
            delta,
            theta,
            alpha,
            beta,
            gamma,
        }
    }

    /// Build a fully populated reading
    pub fn new(delta: f64, theta: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self::from_bands([Some(delta), Some(theta), Some(alpha), Some(beta), Some(gamma)])
    }

    /// Values in `BANDS` order
    pub fn bands(&self) -> [Option<f64>; 5] {
        [self.delta, self.theta, self.alpha, self.beta, self.gamma]
    }

    /// True when at least one band carries a value
    pub fn has_any_band(&self) -> bool {
        self.bands().iter().any(Option::is_some)
    }

    /// Every band must be present and finite before submission to a classifier
    pub fn validate(&self) -> Result<(), ReadingError> {
        for (name, value) in Self::BANDS.iter().zip(self.bands()) {
            match value {
                None => return Err(ReadingError::MissingValue(name)),
                Some(v) if !v.is_finite() => return Err(ReadingError::NonFinite(name)),
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// GSR / SpO2 pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiometricReading {
    pub gsr: f64,
    pub spo2: f64,
}

impl BiometricReading {
    pub fn new(gsr: f64, spo2: f64) -> Self {
        Self { gsr, spo2 }
    }

    pub fn validate(&self) -> Result<(), ReadingError> {
        if !self.gsr.is_finite() {
            return Err(ReadingError::NonFinite("gsr"));
        }
        if !self.spo2.is_finite() {
            return Err(ReadingError::NonFinite("spo2"));
        }
        if !(0.0..=100.0).contains(&self.spo2) {
            return Err(ReadingError::Spo2OutOfRange(self.spo2));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bands_drops_non_finite() {
        let reading = EegReading::from_bands([Some(1.0), Some(f64::NAN), None, Some(f64::INFINITY), Some(5.0)]);
        assert_eq!(reading.delta, Some(1.0));
        assert_eq!(reading.theta, None);
        assert_eq!(reading.beta, None);
        assert_eq!(reading.gamma, Some(5.0));
    }

    #[test]
    fn test_eeg_validate_reports_first_missing_band() {
        let mut reading = EegReading::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert!(reading.validate().is_ok());

        reading.alpha = None;
        assert_eq!(reading.validate(), Err(ReadingError::MissingValue("alpha")));
    }

    #[test]
    fn test_biometric_spo2_range() {
        assert!(BiometricReading::new(0.28, 98.2).validate().is_ok());
        assert!(BiometricReading::new(0.28, 0.0).validate().is_ok());
        assert!(BiometricReading::new(0.28, 100.0).validate().is_ok());
        assert_eq!(
            BiometricReading::new(0.28, 100.5).validate(),
            Err(ReadingError::Spo2OutOfRange(100.5))
        );
        assert_eq!(
            BiometricReading::new(f64::NAN, 98.0).validate(),
            Err(ReadingError::NonFinite("gsr"))
        );
    }

    #[test]
    fn test_eeg_serializes_null_bands() {
        let reading = EegReading::from_bands([Some(1.0), None, None, None, None]);
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["delta"], 1.0);
        assert!(json["theta"].is_null());
    }
}
