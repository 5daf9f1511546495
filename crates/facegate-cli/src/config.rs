use std::path::PathBuf;
use std::time::Duration;

use facegate_core::{HysteresisRule, LivenessConfig, OrchestratorConfig};

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the recognition service.
    pub server_url: String,
    /// Liveness polling budget per session.
    pub max_attempts: u32,
    pub tick_interval_ms: u64,
    /// Minimum openness drop between two samples that counts as a blink.
    pub blink_min_drop: f32,
    /// Openness below which the eyes count as closed.
    pub blink_closed_below: f32,
    pub required_blinks: u32,
    pub jpeg_quality: u8,
    /// TCP connect timeout. Requests themselves are not time-limited.
    pub connect_timeout_secs: u64,
    /// Default directory of still images for the directory camera.
    pub frames_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_url: var("FACEGATE_SERVER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:5000".to_string()),
            max_attempts: parse_or(&var, "FACEGATE_MAX_ATTEMPTS", 50),
            tick_interval_ms: parse_or(&var, "FACEGATE_TICK_INTERVAL_MS", 100),
            blink_min_drop: parse_or(&var, "FACEGATE_BLINK_MIN_DROP", 0.1),
            blink_closed_below: parse_or(&var, "FACEGATE_BLINK_CLOSED_BELOW", 0.19),
            required_blinks: parse_or(&var, "FACEGATE_REQUIRED_BLINKS", 1).max(1),
            jpeg_quality: parse_or(&var, "FACEGATE_JPEG_QUALITY", 92u8).clamp(1, 100),
            connect_timeout_secs: parse_or(&var, "FACEGATE_CONNECT_TIMEOUT_SECS", 5),
            frames_dir: var("FACEGATE_FRAMES_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            liveness: LivenessConfig {
                max_attempts: self.max_attempts,
                tick_interval: Duration::from_millis(self.tick_interval_ms),
                rule: HysteresisRule {
                    min_drop: self.blink_min_drop,
                    closed_below: self.blink_closed_below,
                },
                required_blinks: self.required_blinks,
            },
            ..OrchestratorConfig::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]);
        assert_eq!(config.server_url, "http://127.0.0.1:5000");
        assert_eq!(config.max_attempts, 50);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.required_blinks, 1);
        assert_eq!(config.jpeg_quality, 92);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.frames_dir, None);

        let orchestrator = config.orchestrator();
        assert_eq!(orchestrator.liveness, LivenessConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("FACEGATE_SERVER_URL", "https://faces.example.org"),
            ("FACEGATE_MAX_ATTEMPTS", "100"),
            ("FACEGATE_TICK_INTERVAL_MS", "250"),
            ("FACEGATE_BLINK_CLOSED_BELOW", "0.2"),
            ("FACEGATE_FRAMES_DIR", "/tmp/frames"),
        ]);
        assert_eq!(config.server_url, "https://faces.example.org");

        let liveness = config.orchestrator().liveness;
        assert_eq!(liveness.max_attempts, 100);
        assert_eq!(liveness.tick_interval, Duration::from_millis(250));
        assert_eq!(liveness.rule.closed_below, 0.2);
        assert_eq!(liveness.rule.min_drop, 0.1);
        assert_eq!(config.frames_dir, Some(PathBuf::from("/tmp/frames")));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = load(&[
            ("FACEGATE_MAX_ATTEMPTS", "lots"),
            ("FACEGATE_REQUIRED_BLINKS", "0"),
            ("FACEGATE_JPEG_QUALITY", "0"),
            ("FACEGATE_FRAMES_DIR", ""),
        ]);
        assert_eq!(config.max_attempts, 50);
        assert_eq!(config.required_blinks, 1);
        assert_eq!(config.jpeg_quality, 1);
        assert_eq!(config.frames_dir, None);
    }
}
