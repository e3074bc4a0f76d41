//! Configuration surface, §6. Field names are contractual — they are read from YAML
//! (mirroring `opcua_core::config::Config`'s `serde_yaml`-backed `load`) or set
//! through [`ClientCoreConfigBuilder`], the way the teacher's `ClientBuilder` layers
//! over `ClientConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_application_name() -> String {
    "Namotion.Interceptor.Client".to_string()
}

fn default_maximum_items_per_subscription() -> usize {
    1000
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_session_disposal_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_write_queue_size() -> usize {
    1000
}

fn always_true() -> bool {
    true
}

/// §6 configuration surface table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCoreConfig {
    pub server_url: String,
    pub root_name: Option<String>,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    pub default_namespace_uri: Option<String>,
    #[serde(default = "default_maximum_items_per_subscription")]
    pub maximum_items_per_subscription: usize,
    #[serde(with = "humantime_duration", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,
    #[serde(with = "humantime_duration", default = "default_reconnect_interval")]
    pub reconnect_interval: Duration,
    #[serde(with = "humantime_duration", default = "default_session_timeout")]
    pub session_timeout: Duration,
    #[serde(
        with = "humantime_duration",
        default = "default_session_disposal_timeout"
    )]
    pub session_disposal_timeout: Duration,
    #[serde(with = "humantime_duration", default = "default_health_check_interval")]
    pub subscription_health_check_interval: Duration,
    #[serde(default = "default_write_queue_size")]
    pub write_queue_size: usize,
    #[serde(default)]
    pub enable_remote_node_management: bool,
    #[serde(default = "always_true")]
    pub should_add_dynamic_properties: bool,
    #[serde(default)]
    pub pki_dir: PathBuf,
    #[serde(default)]
    pub auto_accept_untrusted_certificates: bool,
}

impl Default for ClientCoreConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            root_name: None,
            application_name: default_application_name(),
            default_namespace_uri: None,
            maximum_items_per_subscription: default_maximum_items_per_subscription(),
            reconnect_delay: default_reconnect_delay(),
            reconnect_interval: default_reconnect_interval(),
            session_timeout: default_session_timeout(),
            session_disposal_timeout: default_session_disposal_timeout(),
            subscription_health_check_interval: default_health_check_interval(),
            write_queue_size: default_write_queue_size(),
            enable_remote_node_management: false,
            should_add_dynamic_properties: true,
            pki_dir: PathBuf::from("pki"),
            auto_accept_untrusted_certificates: true,
        }
    }
}

impl ClientCoreConfig {
    /// Load from a YAML file, following the teacher's `Config::load` convention.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_yaml::from_str(&contents).map_err(ConfigError::Yaml)
    }

    /// Validate required fields, returning the same "list of error strings" shape
    /// as the teacher's `ClientBuilder::client()`.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.server_url.is_empty() {
            errors.push("server_url must be set".to_string());
        }
        if self.maximum_items_per_subscription == 0 {
            errors.push("maximum_items_per_subscription must be greater than zero".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Application URI, per §6 certificate store layout:
    /// `urn:{host}:Namotion.Interceptor:{application_name}`.
    pub fn application_uri(&self) -> String {
        let host = gethostname::gethostname()
            .into_string()
            .unwrap_or_else(|_| "localhost".to_string());
        format!("urn:{host}:Namotion.Interceptor:{}", self.application_name)
    }

    /// Certificate subject, per §6: `CN={application_name}, O=Namotion`.
    pub fn certificate_subject(&self) -> String {
        format!("CN={}, O=Namotion", self.application_name)
    }

    pub fn pki_own_dir(&self) -> PathBuf {
        self.pki_dir.join("own")
    }

    pub fn pki_trusted_dir(&self) -> PathBuf {
        self.pki_dir.join("trusted")
    }

    pub fn pki_rejected_dir(&self) -> PathBuf {
        self.pki_dir.join("rejected")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[source] std::io::Error),
    #[error("failed to parse configuration file: {0}")]
    Yaml(#[source] serde_yaml::Error),
}

/// Builder mirroring the teacher's `ClientBuilder`, letting callers assemble a
/// config field-by-field instead of loading YAML.
#[derive(Default)]
pub struct ClientCoreConfigBuilder {
    config: ClientCoreConfig,
}

impl ClientCoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn root_name(mut self, root_name: impl Into<String>) -> Self {
        self.config.root_name = Some(root_name.into());
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    pub fn maximum_items_per_subscription(mut self, n: usize) -> Self {
        self.config.maximum_items_per_subscription = n;
        self
    }

    pub fn write_queue_size(mut self, n: usize) -> Self {
        self.config.write_queue_size = n;
        self
    }

    pub fn enable_remote_node_management(mut self, enabled: bool) -> Self {
        self.config.enable_remote_node_management = enabled;
        self
    }

    pub fn build(self) -> Result<ClientCoreConfig, Vec<String>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
