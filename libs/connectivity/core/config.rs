use crate::error::{ConnectivityError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings of one connection
///
/// A client copies these at construction; later edits made by the owning
/// connection never reach a running client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub name: String,

    /// Directory for files of this connection type (unhandled messages etc.)
    pub storage_dir: PathBuf,

    /// Upper bound for one blocking read of the receiver
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after each received message
    #[serde(default)]
    pub read_delay_ms: u64,

    /// Consecutive read errors before the receiver gives up (0 = never)
    #[serde(default = "default_max_read_errors")]
    pub max_read_errors: u32,

    /// How long each dispatch worker may drain its queue on dispose
    #[serde(default = "default_dispatch_drain_timeout_ms")]
    pub dispatch_drain_timeout_ms: u64,

    /// Queue length that triggers a "listeners are falling behind" warning
    #[serde(default)]
    pub queue_high_water_mark: Option<usize>,

    /// Whether to start a receiver when the transport can read
    #[serde(default = "default_true")]
    pub receive: bool,

    #[serde(default)]
    pub listeners: Vec<ListenerConfiguration>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Declarative description of a listener, built by `ListenerFactory`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfiguration {
    pub name: String,

    /// Listener kind: "File" or "Collector"
    #[serde(rename = "type")]
    pub listener_type: String,

    /// Kind-specific settings string
    #[serde(default)]
    pub settings: String,

    #[serde(default = "default_true")]
    pub active_for_received: bool,

    #[serde(default)]
    pub active_for_sent: bool,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_max_read_errors() -> u32 {
    10
}

fn default_dispatch_drain_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ConnectionSettings {
    /// Settings with defaults for everything but name and storage
    pub fn new(name: impl Into<String>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            storage_dir: storage_dir.into(),
            poll_interval_ms: default_poll_interval_ms(),
            read_delay_ms: 0,
            max_read_errors: default_max_read_errors(),
            dispatch_drain_timeout_ms: default_dispatch_drain_timeout_ms(),
            queue_high_water_mark: None,
            receive: true,
            listeners: Vec::new(),
            log_level: default_log_level(),
        }
    }

    /// Load settings from a YAML file and validate them
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectivityError::Settings(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text and validate them
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: ConnectionSettings = serde_yaml::from_str(content)
            .map_err(|e| ConnectivityError::Settings(format!("Failed to parse YAML: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConnectivityError::Settings(
                "Connection name is not specified".to_string(),
            ));
        }

        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConnectivityError::Settings(format!(
                "{}: storage_dir must not be empty",
                self.name
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConnectivityError::Settings(format!(
                "{}: poll_interval_ms must be greater than 0",
                self.name
            )));
        }

        let mut names = std::collections::HashSet::new();
        for listener in &self.listeners {
            if listener.name.trim().is_empty() {
                return Err(ConnectivityError::Settings(format!(
                    "{}: listener name must not be empty",
                    self.name
                )));
            }
            if !names.insert(listener.name.as_str()) {
                return Err(ConnectivityError::Settings(format!(
                    "{}: duplicate listener name '{}'",
                    self.name, listener.name
                )));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.read_delay_ms)
    }

    pub fn dispatch_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_drain_timeout_ms)
    }
}

impl ListenerConfiguration {
    pub fn new(name: impl Into<String>, listener_type: impl Into<String>, settings: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener_type: listener_type.into(),
            settings: settings.into(),
            active_for_received: true,
            active_for_sent: false,
        }
    }

    pub fn with_directions(mut self, received: bool, sent: bool) -> Self {
        self.active_for_received = received;
        self.active_for_sent = sent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
name: Gateway
storage_dir: /tmp/conns/MQ
listeners:
  - name: audit
    type: File
    settings: /tmp/audit.dat
    active_for_sent: true
"#;
        let settings = ConnectionSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.max_read_errors, 10);
        assert_eq!(settings.dispatch_drain_timeout(), Duration::from_secs(5));
        assert!(settings.receive);
        assert_eq!(settings.queue_high_water_mark, None);
        assert_eq!(settings.log_level, "info");

        let listener = &settings.listeners[0];
        assert_eq!(listener.listener_type, "File");
        assert!(listener.active_for_received);
        assert!(listener.active_for_sent);
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = ConnectionSettings::new(" ", "/tmp").validate().unwrap_err();
        assert!(matches!(err, ConnectivityError::Settings(_)));
    }

    #[test]
    fn test_duplicate_listener_names_rejected() {
        let mut settings = ConnectionSettings::new("Gateway", "/tmp");
        settings.listeners.push(ListenerConfiguration::new("a", "File", "x.dat"));
        settings.listeners.push(ListenerConfiguration::new("a", "Collector", ""));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_settings_error() {
        let err = ConnectionSettings::from_yaml("name: [unterminated").unwrap_err();
        assert!(matches!(err, ConnectivityError::Settings(_)));
    }
}
