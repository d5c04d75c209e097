//! Simulator tunables.

use std::time::Duration;

use serde::Deserialize;

/// Settings of the simulated XenAPI service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Initial password of the `root` user
    pub root_password: String,

    /// Sessions idle for longer than this are expired
    pub session_idle_timeout_secs: u64,

    /// Interval between expiry sweeps
    pub session_sweep_interval_secs: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            root_password: "xenserver".to_string(),
            session_idle_timeout_secs: 24 * 60 * 60,
            session_sweep_interval_secs: 5 * 60,
        }
    }
}

impl SimulatorSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SimulatorSettings::default();
        assert_eq!(settings.root_password, "xenserver");
        assert_eq!(settings.idle_timeout(), Duration::from_secs(86_400));
        assert_eq!(settings.sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let settings: SimulatorSettings =
            serde_json::from_value(serde_json::json!({"root_password": "s3cret"})).unwrap();
        assert_eq!(settings.root_password, "s3cret");
        assert_eq!(settings.session_sweep_interval_secs, 300);
    }

    #[test]
    fn test_zero_sweep_interval_is_clamped() {
        let settings = SimulatorSettings {
            session_sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.sweep_interval(), Duration::from_secs(1));
    }
}
