use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use crate::error::ConfigError;

// --------------------------------------------------------------------------------------------------------------

/// What to do with a message whose decode or handling failed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Consume the message anyway (at-most-once from the consumer's view).
    #[default]
    Delete,
    /// Leave it on the queue so it becomes visible again for another attempt.
    Retain,
}

// --------------------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    // --- connectivity ---

    /// Queue service endpoint, e.g. a LocalStack instance at "http://localhost:4566".
    /// Empty means the regional AWS endpoint.
    pub endpoint_url: String,
    pub region: String,
    /// Static credentials. Empty means the AWS default credential chain. LocalStack accepts "test".
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Inbound queue carrying onboarding/offboarding requests and battery commands.
    pub commands_queue_url: String,
    /// Outbound queue receiving responses and telemetry.
    pub telemetry_queue_url: String,

    // --- polling ---

    /// Upper bound on messages per receive call (SQS caps this at 10).
    pub max_messages: u32,
    /// Long-poll wait per receive call.
    pub wait_time_seconds: u64,
    /// Pause after a failed receive before polling again.
    pub receive_error_pause_seconds: u64,

    // --- emitted events ---

    /// Interval between two telemetry envelopes of one session.
    pub telemetry_interval_seconds: u64,
    /// `source` attribute stamped on every outbound envelope.
    pub event_source: String,
    pub site_id: String,
    pub device_id: String,
    /// Serial number reported when a request carries none.
    pub default_serial_number: String,

    // --- dispatch ---

    pub failure_policy: FailurePolicy,

    // --- logging ---

    /// Log level: "Trace", "Debug", "Info", "Warn", "Error"
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // connectivity
            endpoint_url:        "http://localhost:4566".to_string(),
            region:              "ap-southeast-2".to_string(),
            access_key_id:       "test".to_string(),
            secret_access_key:   "test".to_string(),
            commands_queue_url:  "http://localhost:4566/000000000000/commands-demo".to_string(),
            telemetry_queue_url: "http://localhost:4566/000000000000/telemetry-demo".to_string(),
            // polling
            max_messages:                5,
            wait_time_seconds:           10,
            receive_error_pause_seconds: 5,
            // emitted events
            telemetry_interval_seconds: 60,
            event_source:          "urn:example:oem".to_string(),
            site_id:               "SiteABC".to_string(),
            device_id:             "Device123".to_string(),
            default_serial_number: "SN123".to_string(),
            // dispatch
            failure_policy: FailurePolicy::Delete,
            // logging
            log_level: "Info".to_string(),
        }
    }
}

impl Config {
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }

    pub fn receive_error_pause(&self) -> Duration {
        Duration::from_secs(self.receive_error_pause_seconds)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry_interval_seconds)
    }
}

// --------------------------------------------------------------------------------------------------------------

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Load the configuration from `path`.
/// A missing file yields the defaults; an unreadable or malformed one is an error.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config_data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(source) => {
            return Err(ConfigError::Io { path: path.to_string(), source });
        }
    };

    parse_config(&config_data).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
}

pub fn parse_config(json: &str) -> Result<Config, serde_json::Error> {
    serde_json::from_str(json)
}

// --------------------------------------------------------------------------------------------------------------
