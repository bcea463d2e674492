//! Runtime configuration for apm-session
//!
//! Priority: command line (with environment fallbacks handled by clap) >
//! TOML file > compiled defaults.

use crate::models::StepTiming;
use crate::services::fusion_engine::{
    DEFAULT_BIOMETRIC_WEIGHT, DEFAULT_CONFLICT_GAP_THRESHOLD, DEFAULT_EEG_WEIGHT,
};
use crate::services::{
    candidate_list, FusionParams, DEFAULT_CLASSIFY_TIMEOUT, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_SAVE_TIMEOUT,
};
use apm_common::config::{TomlConfig, DEFAULT_PORT, DEFAULT_SERVICE_URL};
use apm_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub classifier_urls: Vec<String>,
    pub store_url: Option<String>,
    pub doctor_id: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port: u16,
    /// Ordered endpoint candidates (overrides first, default last)
    pub classifier_candidates: Vec<String>,
    /// Report store base; the resolved classifier base when unset
    pub store_url: Option<String>,
    pub doctor_id: Option<String>,
    pub probe_timeout: Duration,
    pub classify_timeout: Duration,
    pub save_timeout: Duration,
    pub fusion: FusionParams,
    pub timing: StepTiming,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl SessionConfig {
    pub fn resolve(overrides: ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let explicit_urls = if overrides.classifier_urls.is_empty() {
            toml.classifier_urls.clone()
        } else {
            overrides.classifier_urls
        };
        let classifier_candidates = candidate_list(&explicit_urls, &[DEFAULT_SERVICE_URL]);

        let fusion = FusionParams::new(
            toml.fusion.eeg_weight.unwrap_or(DEFAULT_EEG_WEIGHT),
            toml.fusion.biometric_weight.unwrap_or(DEFAULT_BIOMETRIC_WEIGHT),
            toml.fusion
                .conflict_gap_threshold
                .unwrap_or(DEFAULT_CONFLICT_GAP_THRESHOLD),
        )
        .map_err(|e| Error::Config(format!("[fusion]: {}", e)))?;

        let defaults = StepTiming::default();
        let timing = StepTiming {
            connect: toml.timing.connect_ms.map(Duration::from_millis).unwrap_or(defaults.connect),
            analyzing: toml
                .timing
                .analyzing_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.analyzing),
            fuse: toml.timing.fuse_ms.map(Duration::from_millis).unwrap_or(defaults.fuse),
        };

        let store_url = overrides
            .store_url
            .or_else(|| toml.store_url.clone())
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            classifier_candidates,
            store_url,
            doctor_id: overrides.doctor_id.or_else(|| toml.doctor_id.clone()),
            probe_timeout: toml
                .probe_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PROBE_TIMEOUT),
            classify_timeout: toml
                .classify_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CLASSIFY_TIMEOUT),
            save_timeout: toml
                .save_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SAVE_TIMEOUT),
            fusion,
            timing,
            log_level: overrides.log_level.unwrap_or_else(|| toml.logging.level.clone()),
            log_file: toml.logging.file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::resolve(ConfigOverrides::default(), &TomlConfig::default()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.classifier_candidates, vec![DEFAULT_SERVICE_URL.to_string()]);
        assert_eq!(config.probe_timeout, Duration::from_millis(1200));
        assert_eq!(config.save_timeout, Duration::from_secs(10));
        assert_eq!(config.fusion.weights().eeg, 0.7);
        assert_eq!(config.timing, StepTiming::default());
        assert_eq!(config.log_level, "info");
        assert!(config.store_url.is_none());
    }

    #[test]
    fn test_overrides_beat_toml() {
        let toml: TomlConfig = toml::from_str(
            r#"
            port = 6000
            classifier_urls = ["http://toml-host:5000"]
            store_url = "http://store:7000/"
            doctor_id = "dr-toml"
            "#,
        )
        .unwrap();

        let from_toml = SessionConfig::resolve(ConfigOverrides::default(), &toml).unwrap();
        assert_eq!(from_toml.port, 6000);
        assert_eq!(
            from_toml.classifier_candidates,
            vec!["http://toml-host:5000".to_string(), DEFAULT_SERVICE_URL.to_string()]
        );
        assert_eq!(from_toml.store_url.as_deref(), Some("http://store:7000"));

        let overrides = ConfigOverrides {
            port: Some(7001),
            classifier_urls: vec!["http://cli:1".to_string()],
            doctor_id: Some("dr-cli".to_string()),
            ..Default::default()
        };
        let config = SessionConfig::resolve(overrides, &toml).unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.classifier_candidates[0], "http://cli:1");
        assert_eq!(config.doctor_id.as_deref(), Some("dr-cli"));
    }

    #[test]
    fn test_fusion_and_timing_sections() {
        let toml: TomlConfig = toml::from_str(
            r#"
            [fusion]
            eeg_weight = 0.6
            biometric_weight = 0.4
            conflict_gap_threshold = 5.0

            [timing]
            connect_ms = 10
            "#,
        )
        .unwrap();
        let config = SessionConfig::resolve(ConfigOverrides::default(), &toml).unwrap();
        assert_eq!(config.fusion.weights().biometric, 0.4);
        assert_eq!(config.fusion.conflict_gap_threshold(), 5.0);
        assert_eq!(config.timing.connect, Duration::from_millis(10));
        assert_eq!(config.timing.analyzing, Duration::from_millis(4000));
    }

    #[test]
    fn test_invalid_weights_are_config_error() {
        let toml: TomlConfig = toml::from_str("[fusion]\neeg_weight = 0.9\n").unwrap();
        let err = SessionConfig::resolve(ConfigOverrides::default(), &toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
