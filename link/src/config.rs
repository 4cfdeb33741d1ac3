//! TOML configuration for park-link clients.
//!
//! # Configuration Format
//!
//! ```toml
//! [connection]
//! endpoint = "ws://localhost:8080/ws"
//! auto_reconnect = true
//! queue_capacity = 1024      # per subscription handle
//! request_receipts = false
//!
//! [auth]
//! login = "operator"
//! passcode = "secret"
//!
//! [heartbeat]
//! interval_ms = 10000        # 0 disables heartbeats and the watchdog
//! tolerance = 3              # missed intervals before the link is dropped
//!
//! [timeouts]
//! connection_timeout_ms = 10000
//! handshake_timeout_ms = 10000
//! send_timeout_ms = 10000
//!
//! [reconnect]
//! delay_ms = 1000
//! max_delay_ms = 30000
//! jitter = 0.2
//!
//! [subscriptions]
//! topics = ["/topic/reservation"]
//! lots = [1, 2]              # dashboard + alerts topics per lot
//! ```
//!
//! Every section is optional. Environment variables override the file:
//! `PARKLINK_ENDPOINT`, `PARKLINK_LOGIN`, `PARKLINK_PASSCODE`,
//! `PARKLINK_HEARTBEAT_MS`, `PARKLINK_HANDSHAKE_TIMEOUT_MS`,
//! `PARKLINK_RECONNECT_DELAY_MS`, `PARKLINK_MAX_RECONNECT_DELAY_MS`,
//! `PARKLINK_QUEUE_CAPACITY`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ParkLinkError, Result};
use crate::models::{ConnectionOptions, Credentials, Topic};
use crate::timeouts::ParkLinkTimeouts;
use crate::transport::resolve_endpoint;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

/// Client configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkLinkConfig {
    pub connection: ConnectionSection,
    pub auth: AuthSection,
    pub heartbeat: HeartbeatSection,
    pub timeouts: TimeoutsSection,
    pub reconnect: ReconnectSection,
    pub subscriptions: SubscriptionsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub endpoint: String,
    pub auto_reconnect: bool,
    pub queue_capacity: usize,
    pub request_receipts: bool,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        let options = ConnectionOptions::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auto_reconnect: options.auto_reconnect,
            queue_capacity: options.queue_capacity,
            request_receipts: options.request_receipts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub login: Option<String>,
    pub passcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    pub interval_ms: u64,
    pub tolerance: u32,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        let timeouts = ParkLinkTimeouts::default();
        Self {
            interval_ms: timeouts.heartbeat_interval.as_millis() as u64,
            tolerance: timeouts.heartbeat_tolerance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    pub connection_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub send_timeout_ms: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        let timeouts = ParkLinkTimeouts::default();
        Self {
            connection_timeout_ms: timeouts.connection_timeout.as_millis() as u64,
            handshake_timeout_ms: timeouts.handshake_timeout.as_millis() as u64,
            send_timeout_ms: timeouts.send_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        let options = ConnectionOptions::default();
        Self {
            delay_ms: options.reconnect_delay_ms,
            max_delay_ms: options.max_reconnect_delay_ms,
            jitter: options.reconnect_jitter,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionsSection {
    pub topics: Vec<String>,
    pub lots: Vec<i64>,
}

impl ParkLinkConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment overrides are applied separately via
    /// [`apply_env_overrides`](Self::apply_env_overrides).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParkLinkError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PARKLINK_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("PARKLINK_ENDPOINT") {
            self.connection.endpoint = endpoint;
        }
        if let Some(login) = lookup("PARKLINK_LOGIN") {
            self.auth.login = Some(login);
        }
        if let Some(passcode) = lookup("PARKLINK_PASSCODE") {
            self.auth.passcode = Some(passcode);
        }
        if let Some(raw) = lookup("PARKLINK_HEARTBEAT_MS") {
            self.heartbeat.interval_ms = parse_override("PARKLINK_HEARTBEAT_MS", &raw)?;
        }
        if let Some(raw) = lookup("PARKLINK_HANDSHAKE_TIMEOUT_MS") {
            self.timeouts.handshake_timeout_ms =
                parse_override("PARKLINK_HANDSHAKE_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("PARKLINK_RECONNECT_DELAY_MS") {
            self.reconnect.delay_ms = parse_override("PARKLINK_RECONNECT_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("PARKLINK_MAX_RECONNECT_DELAY_MS") {
            self.reconnect.max_delay_ms =
                parse_override("PARKLINK_MAX_RECONNECT_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("PARKLINK_QUEUE_CAPACITY") {
            self.connection.queue_capacity = parse_override("PARKLINK_QUEUE_CAPACITY", &raw)?;
        }
        Ok(())
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;

        if self.connection.queue_capacity == 0 {
            return Err(ParkLinkError::ConfigurationError(
                "queue_capacity cannot be 0".to_string(),
            ));
        }

        if self.heartbeat.interval_ms > 0 && self.heartbeat.tolerance == 0 {
            return Err(ParkLinkError::ConfigurationError(
                "heartbeat tolerance must be at least 1 when heartbeats are enabled".to_string(),
            ));
        }

        if self.reconnect.delay_ms == 0 {
            return Err(ParkLinkError::ConfigurationError(
                "reconnect delay_ms cannot be 0".to_string(),
            ));
        }

        if self.reconnect.max_delay_ms < self.reconnect.delay_ms {
            return Err(ParkLinkError::ConfigurationError(format!(
                "reconnect max_delay_ms ({}) cannot be lower than delay_ms ({})",
                self.reconnect.max_delay_ms, self.reconnect.delay_ms
            )));
        }

        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(ParkLinkError::ConfigurationError(format!(
                "reconnect jitter must be between 0 and 1, got {}",
                self.reconnect.jitter
            )));
        }

        if self.auth.passcode.is_some() && self.auth.login.is_none() {
            return Err(ParkLinkError::ConfigurationError(
                "auth passcode is set without a login".to_string(),
            ));
        }

        self.topics()?;
        Ok(())
    }

    /// The endpoint as a WebSocket URL.
    pub fn endpoint(&self) -> Result<Url> {
        resolve_endpoint(&self.connection.endpoint)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            login: self.auth.login.clone(),
            passcode: self.auth.passcode.clone(),
        }
    }

    pub fn timeouts(&self) -> ParkLinkTimeouts {
        ParkLinkTimeouts::builder()
            .connection_timeout(Duration::from_millis(self.timeouts.connection_timeout_ms))
            .handshake_timeout(Duration::from_millis(self.timeouts.handshake_timeout_ms))
            .send_timeout(Duration::from_millis(self.timeouts.send_timeout_ms))
            .heartbeat_interval(Duration::from_millis(self.heartbeat.interval_ms))
            .heartbeat_tolerance(self.heartbeat.tolerance)
            .build()
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::new()
            .with_auto_reconnect(self.connection.auto_reconnect)
            .with_reconnect_delay_ms(self.reconnect.delay_ms)
            .with_max_reconnect_delay_ms(self.reconnect.max_delay_ms)
            .with_reconnect_jitter(self.reconnect.jitter)
            .with_queue_capacity(self.connection.queue_capacity)
            .with_request_receipts(self.connection.request_receipts)
    }

    /// Configured topics followed by the dashboard and alert topics of each
    /// configured lot, without duplicates.
    pub fn topics(&self) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = Vec::new();
        let explicit = self
            .subscriptions
            .topics
            .iter()
            .map(|raw| Topic::new(raw.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let per_lot = self
            .subscriptions
            .lots
            .iter()
            .flat_map(|&lot| [Topic::lot_dashboard(lot), Topic::lot_alerts(lot)]);

        for topic in explicit.into_iter().chain(per_lot) {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        Ok(topics)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ParkLinkError::ConfigurationError(format!("Invalid {} value: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ParkLinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint().unwrap().as_str(), DEFAULT_ENDPOINT);
        assert!(config.credentials().is_anonymous());
        assert_eq!(config.timeouts(), ParkLinkTimeouts::default());
        assert_eq!(config.connection_options(), ConnectionOptions::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config = ParkLinkConfig::from_toml_str(
            r#"
            [connection]
            endpoint = "https://parking.example.com"
            queue_capacity = 64

            [auth]
            login = "ops"
            passcode = "s3cret"

            [heartbeat]
            interval_ms = 5000
            tolerance = 2

            [reconnect]
            delay_ms = 250
            max_delay_ms = 4000
            jitter = 0.0

            [subscriptions]
            topics = ["/topic/reservation", "/topic/dashboard/1"]
            lots = [1, 2]
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.endpoint().unwrap().as_str(), "wss://parking.example.com/ws");
        assert_eq!(config.credentials(), Credentials::new("ops", "s3cret"));

        let timeouts = config.timeouts();
        assert_eq!(timeouts.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(timeouts.watchdog_window(), Some(Duration::from_secs(10)));

        let options = config.connection_options();
        assert_eq!(options.queue_capacity, 64);
        assert_eq!(options.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(options.max_reconnect_delay(), Duration::from_secs(4));

        let topics: Vec<String> = config.topics().unwrap().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            topics,
            vec![
                "/topic/reservation",
                "/topic/dashboard/1",
                "/topic/alerts/1",
                "/topic/dashboard/2",
                "/topic/alerts/2",
            ]
        );
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PARKLINK_ENDPOINT", "ws://broker:9000/stomp"),
            ("PARKLINK_LOGIN", "svc"),
            ("PARKLINK_PASSCODE", "pw"),
            ("PARKLINK_HEARTBEAT_MS", "0"),
            ("PARKLINK_QUEUE_CAPACITY", "16"),
        ]
        .into_iter()
        .collect();

        let mut config = ParkLinkConfig::default();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.endpoint().unwrap().as_str(), "ws://broker:9000/stomp");
        assert_eq!(config.credentials(), Credentials::new("svc", "pw"));
        assert_eq!(config.timeouts().watchdog_window(), None);
        assert_eq!(config.connection_options().queue_capacity, 16);
    }

    #[test]
    fn test_invalid_override_value() {
        let mut config = ParkLinkConfig::default();
        let err = config
            .apply_overrides_from(|key| (key == "PARKLINK_QUEUE_CAPACITY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ParkLinkError::ConfigurationError(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ParkLinkConfig::default();
        config.reconnect.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = ParkLinkConfig::default();
        config.connection.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ParkLinkConfig::default();
        config.connection.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = ParkLinkConfig::default();
        config.subscriptions.topics = vec![String::new()];
        assert!(config.validate().is_err());

        let mut config = ParkLinkConfig::default();
        config.auth.passcode = Some("orphan".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_configuration_error() {
        let err = ParkLinkConfig::from_toml_str("[connection\nendpoint = 1").unwrap_err();
        assert!(matches!(err, ParkLinkError::ConfigurationError(_)));
    }
}
