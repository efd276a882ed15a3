//! Alerting thresholds and deduplication windows.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::{AlertKind, Severity};

/// Longest accepted suppression window (30 days).
pub const MAX_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

/// Configuration for alert classification and suppression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRules {
    /// Suppression window for geofence, altitude and emergency alerts (seconds)
    pub zone_alert_window_secs: i64,
    /// Suppression window for low-battery alerts (seconds)
    pub battery_alert_window_secs: i64,
    /// Below this percentage a medium low-battery alert is raised
    pub battery_warning_pct: f64,
    /// Below this percentage the low-battery alert is high severity
    pub battery_critical_pct: f64,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            zone_alert_window_secs: 300,
            battery_alert_window_secs: 600,
            battery_warning_pct: 20.0,
            battery_critical_pct: 10.0,
        }
    }
}

impl AlertRules {
    /// Deduplication window for an alert kind.
    pub fn window_for(&self, kind: AlertKind) -> Duration {
        let secs = match kind {
            AlertKind::LowBattery => self.battery_alert_window_secs,
            AlertKind::GeofenceViolation | AlertKind::AltitudeViolation | AlertKind::Emergency => {
                self.zone_alert_window_secs
            }
        };
        Duration::seconds(secs.clamp(0, MAX_WINDOW_SECS))
    }

    /// Severity of a low-battery condition, or `None` when the level is fine.
    pub fn battery_severity(&self, battery_pct: f64) -> Option<Severity> {
        if battery_pct < self.battery_critical_pct {
            Some(Severity::High)
        } else if battery_pct < self.battery_warning_pct {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}
