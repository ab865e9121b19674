//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How `download_all` issues its downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One download at a time, spaced by `download_delay_ms`.
    #[default]
    Sequential,
    /// All downloads at once, no spacing.
    Parallel,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Sequential => write!(f, "sequential"),
            DispatchMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Configuration for the batch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause between successive downloads in sequential mode.
    pub download_delay_ms: u64,
    /// Upper bound for a single transform call. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_timeout_secs: Option<u64>,
    pub dispatch_mode: DispatchMode,
    /// Capacity of the progress event channel.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_delay_ms: 300,
            transform_timeout_secs: None,
            dispatch_mode: DispatchMode::Sequential,
            event_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn with_download_delay_ms(mut self, delay_ms: u64) -> Self {
        self.download_delay_ms = delay_ms;
        self
    }

    pub fn with_transform_timeout_secs(mut self, secs: u64) -> Self {
        self.transform_timeout_secs = Some(secs);
        self
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }

    pub fn transform_timeout(&self) -> Option<Duration> {
        self.transform_timeout_secs.map(Duration::from_secs)
    }

    /// Build a config from environment variables.
    ///
    /// - `BATCH_DOWNLOAD_DELAY_MS` (default: 300)
    /// - `BATCH_TRANSFORM_TIMEOUT_SECS` (default: unset, no timeout)
    /// - `BATCH_DISPATCH_MODE` (`sequential` or `parallel`)
    /// - `BATCH_EVENT_CAPACITY` (default: 1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let mut cfg = Self::default();

        if let Some(v) = get("BATCH_DOWNLOAD_DELAY_MS") {
            cfg.download_delay_ms = parse_number("BATCH_DOWNLOAD_DELAY_MS", &v)?;
        }
        if let Some(v) = get("BATCH_TRANSFORM_TIMEOUT_SECS") {
            let secs: u64 = parse_number("BATCH_TRANSFORM_TIMEOUT_SECS", &v)?;
            cfg.transform_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = get("BATCH_DISPATCH_MODE") {
            cfg.dispatch_mode = match v.to_ascii_lowercase().as_str() {
                "sequential" | "seq" => DispatchMode::Sequential,
                "parallel" | "par" => DispatchMode::Parallel,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "BATCH_DISPATCH_MODE".into(),
                        value: v,
                        reason: "expected sequential|parallel".into(),
                    });
                }
            };
        }
        if let Some(v) = get("BATCH_EVENT_CAPACITY") {
            let capacity: usize = parse_number("BATCH_EVENT_CAPACITY", &v)?;
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "BATCH_EVENT_CAPACITY".into(),
                    value: v,
                    reason: "must be greater than zero".into(),
                });
            }
            cfg.event_capacity = capacity;
        }

        Ok(cfg)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.download_delay(), Duration::from_millis(300));
        assert_eq!(cfg.transform_timeout(), None);
    }

    #[test]
    fn reads_overrides() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            ("BATCH_DOWNLOAD_DELAY_MS", "50"),
            ("BATCH_TRANSFORM_TIMEOUT_SECS", "10"),
            ("BATCH_DISPATCH_MODE", "Parallel"),
            ("BATCH_EVENT_CAPACITY", " 16 "),
        ]))
        .unwrap();
        assert_eq!(cfg.download_delay_ms, 50);
        assert_eq!(cfg.transform_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(cfg.dispatch_mode, DispatchMode::Parallel);
        assert_eq!(cfg.event_capacity, 16);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let cfg =
            PipelineConfig::from_lookup(lookup(&[("BATCH_TRANSFORM_TIMEOUT_SECS", "0")])).unwrap();
        assert_eq!(cfg.transform_timeout_secs, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(PipelineConfig::from_lookup(lookup(&[("BATCH_DOWNLOAD_DELAY_MS", "soon")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("BATCH_DISPATCH_MODE", "zip")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("BATCH_EVENT_CAPACITY", "0")])).is_err());
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"dispatch_mode":"parallel"}"#).unwrap();
        assert_eq!(cfg.dispatch_mode, DispatchMode::Parallel);
        assert_eq!(cfg.download_delay_ms, 300);
    }
}
