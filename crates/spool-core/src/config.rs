//! Scheduler configuration.
//!
//! Parsed from TOML, then overridden by `SPOOL_*` environment variables, then
//! validated. Every field has a default, so an empty document is a valid
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Attempts a task gets before it fails permanently.
    pub task_attempt_limit: u32,

    /// Silence after which an attempt is reclaimed and a worker is no longer alive.
    pub worker_timeout_secs: u64,

    pub liveness_interval_secs: u64,

    pub metrics_interval_secs: u64,

    /// Assumed media length when a document has no duration yet.
    pub default_media_duration_secs: f64,

    /// Credentials guarding the metrics feed. Unset rejects every request.
    pub metrics_username: Option<String>,
    pub metrics_password: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_attempt_limit: 5,
            worker_timeout_secs: 60,
            liveness_interval_secs: 10,
            metrics_interval_secs: 15,
            default_media_duration_secs: 600.0,
            metrics_username: None,
            metrics_password: None,
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, apply `SPOOL_*` overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_toml("")
    }

    /// Convention: `SPOOL_<FIELD>` overrides `<field>`, e.g.
    /// `SPOOL_WORKER_TIMEOUT_SECS` -> `worker_timeout_secs`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = override_value(&lookup, "SPOOL_TASK_ATTEMPT_LIMIT")? {
            self.task_attempt_limit = v;
        }
        if let Some(v) = override_value(&lookup, "SPOOL_WORKER_TIMEOUT_SECS")? {
            self.worker_timeout_secs = v;
        }
        if let Some(v) = override_value(&lookup, "SPOOL_LIVENESS_INTERVAL_SECS")? {
            self.liveness_interval_secs = v;
        }
        if let Some(v) = override_value(&lookup, "SPOOL_METRICS_INTERVAL_SECS")? {
            self.metrics_interval_secs = v;
        }
        if let Some(v) = override_value(&lookup, "SPOOL_DEFAULT_MEDIA_DURATION_SECS")? {
            self.default_media_duration_secs = v;
        }
        if let Some(v) = lookup("SPOOL_METRICS_USERNAME") {
            self.metrics_username = Some(v);
        }
        if let Some(v) = lookup("SPOOL_METRICS_PASSWORD") {
            self.metrics_password = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_attempt_limit == 0 {
            return Err(ConfigError::Invalid(
                "task_attempt_limit must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("worker_timeout_secs", self.worker_timeout_secs),
            ("liveness_interval_secs", self.liveness_interval_secs),
            ("metrics_interval_secs", self.metrics_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if !(self.default_media_duration_secs.is_finite() && self.default_media_duration_secs > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "default_media_duration_secs must be positive, got {}",
                self.default_media_duration_secs
            )));
        }
        Ok(())
    }

    pub fn worker_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.worker_timeout_secs.min(i64::MAX as u64) as i64)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

fn override_value<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::Env {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use rstest::rstest;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_timeout(), chrono::Duration::seconds(60));
    }

    #[test]
    fn toml_fields_override_defaults() {
        let config: SchedulerConfig = toml::from_str(
            r#"
task_attempt_limit = 2
worker_timeout_secs = 30
metrics_username = "prom"
"#,
        )
        .unwrap();
        assert_eq!(config.task_attempt_limit, 2);
        assert_eq!(config.worker_timeout_secs, 30);
        assert_eq!(config.metrics_username.as_deref(), Some("prom"));
        assert_eq!(config.liveness_interval_secs, 10);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<SchedulerConfig>("retry_forever = true").is_err());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = SchedulerConfig {
            worker_timeout_secs: 30,
            ..SchedulerConfig::default()
        };
        config
            .apply_overrides(env(&[
                ("SPOOL_WORKER_TIMEOUT_SECS", "90"),
                ("SPOOL_METRICS_PASSWORD", "s3cret"),
            ]))
            .unwrap();

        assert_eq!(config.worker_timeout_secs, 90);
        assert_eq!(config.metrics_password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn unparseable_env_override_is_an_error() {
        let mut config = SchedulerConfig::default();
        let err = config
            .apply_overrides(env(&[("SPOOL_TASK_ATTEMPT_LIMIT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("SPOOL_TASK_ATTEMPT_LIMIT"));
    }

    #[rstest]
    #[case::zero_attempts(SchedulerConfig {
        task_attempt_limit: 0,
        ..SchedulerConfig::default()
    })]
    #[case::zero_timeout(SchedulerConfig {
        worker_timeout_secs: 0,
        ..SchedulerConfig::default()
    })]
    #[case::zero_liveness(SchedulerConfig {
        liveness_interval_secs: 0,
        ..SchedulerConfig::default()
    })]
    #[case::zero_metrics(SchedulerConfig {
        metrics_interval_secs: 0,
        ..SchedulerConfig::default()
    })]
    #[case::negative_duration(SchedulerConfig {
        default_media_duration_secs: -1.0,
        ..SchedulerConfig::default()
    })]
    #[case::nan_duration(SchedulerConfig {
        default_media_duration_secs: f64::NAN,
        ..SchedulerConfig::default()
    })]
    fn validate_rejects(#[case] config: SchedulerConfig) {
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
