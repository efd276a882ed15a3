//! Server configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use utm_core::hexgrid::{resolution_from_u8, Resolution, DEFAULT_RESOLUTION};
use utm_core::rules::MAX_WINDOW_SECS;
use utm_core::AlertRules;

/// Upper bound for every configured age, window and interval (30 days).
pub const MAX_AGE: Duration = Duration::from_secs(MAX_WINDOW_SECS as u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_path: String,
    pub database_max_connections: u32,
    pub admin_token: String,
    pub hex_resolution: Resolution,
    pub zone_cache_ttl: Duration,
    pub zone_retry_max: Duration,
    pub alert_rules: AlertRules,
    /// Eviction age for landed/emergency/disconnected drones
    pub retention: Duration,
    /// Age after which an in-flight drone is reported silent
    pub silent_airborne: Duration,
    pub sweep_interval: Duration,
    pub tick_interval: Duration,
    /// Only positions updated within this window are pushed on a tick
    pub live_window: Duration,
    pub subscriber_buffer: usize,
    pub query_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            database_path: "data/utm.db".to_string(),
            database_max_connections: 5,
            admin_token: "change-me-admin".to_string(),
            hex_resolution: DEFAULT_RESOLUTION,
            zone_cache_ttl: Duration::from_secs(300),
            zone_retry_max: Duration::from_secs(30),
            alert_rules: AlertRules::default(),
            retention: Duration::from_secs(300),
            silent_airborne: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            tick_interval: Duration::from_millis(1000),
            live_window: Duration::from_secs(10),
            subscriber_buffer: 256,
            query_timeout: Duration::from_millis(2000),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let rules = defaults.alert_rules.clone();

        Self {
            server_port: parse_env("UTM_PORT").unwrap_or(defaults.server_port),
            database_path: env::var("UTM_DATABASE_PATH").unwrap_or(defaults.database_path),
            database_max_connections: parse_env("UTM_DATABASE_MAX_CONNECTIONS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            admin_token: env::var("UTM_ADMIN_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty())
                .unwrap_or(defaults.admin_token),
            hex_resolution: parse_env::<u8>("UTM_HEX_RESOLUTION")
                .and_then(resolution_from_u8)
                .unwrap_or(defaults.hex_resolution),
            zone_cache_ttl: secs_env("UTM_ZONE_CACHE_TTL_SECS").unwrap_or(defaults.zone_cache_ttl),
            zone_retry_max: secs_env("UTM_ZONE_RETRY_MAX_SECS").unwrap_or(defaults.zone_retry_max),
            alert_rules: AlertRules {
                zone_alert_window_secs: window_env("UTM_ZONE_ALERT_WINDOW_SECS")
                    .unwrap_or(rules.zone_alert_window_secs),
                battery_alert_window_secs: window_env("UTM_BATTERY_ALERT_WINDOW_SECS")
                    .unwrap_or(rules.battery_alert_window_secs),
                battery_warning_pct: parse_env("UTM_BATTERY_WARNING_PCT")
                    .unwrap_or(rules.battery_warning_pct),
                battery_critical_pct: parse_env("UTM_BATTERY_CRITICAL_PCT")
                    .unwrap_or(rules.battery_critical_pct),
            },
            retention: secs_env("UTM_RETENTION_SECS").unwrap_or(defaults.retention),
            silent_airborne: secs_env("UTM_SILENT_AIRBORNE_SECS")
                .unwrap_or(defaults.silent_airborne),
            sweep_interval: secs_env("UTM_SWEEP_INTERVAL_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.sweep_interval),
            tick_interval: parse_env::<u64>("UTM_TICK_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            live_window: secs_env("UTM_LIVE_WINDOW_SECS").unwrap_or(defaults.live_window),
            subscriber_buffer: parse_env("UTM_SUBSCRIBER_BUFFER")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.subscriber_buffer),
            query_timeout: parse_env::<u64>("UTM_QUERY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.query_timeout),
            log_format: match env::var("UTM_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn secs_env(key: &str) -> Option<Duration> {
    parse_env::<u64>(key).map(capped_secs)
}

fn window_env(key: &str) -> Option<i64> {
    parse_env::<i64>(key).map(capped_window)
}

fn capped_secs(secs: u64) -> Duration {
    Duration::from_secs(secs).min(MAX_AGE)
}

fn capped_window(secs: i64) -> i64 {
    secs.clamp(0, MAX_WINDOW_SECS)
}

/// `duration` as a chrono delta, capped at [`MAX_AGE`].
pub fn bounded_age(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration.min(MAX_AGE)).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_values_are_capped() {
        assert_eq!(capped_secs(u64::MAX), MAX_AGE);
        assert_eq!(capped_secs(300), Duration::from_secs(300));
        assert_eq!(capped_window(i64::MAX), MAX_WINDOW_SECS);
        assert_eq!(capped_window(-5), 0);
        assert_eq!(bounded_age(Duration::from_secs(u64::MAX)).num_days(), 30);
        assert_eq!(bounded_age(Duration::from_secs(90)).num_seconds(), 90);
    }
}
