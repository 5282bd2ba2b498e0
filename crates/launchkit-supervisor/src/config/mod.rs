//! YAML configuration for the supervisor and the launcher.

use launchkit_common::{ConfigError, ConfigResult};
use launchkit_log_collection::{DeliveryMode, DrainOptions, DEFAULT_READ_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Settings shared by every child a supervisor launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    /// Maximum bytes read from a pipe per chunk.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// How long `terminate` waits after SIGKILL before giving up.
    #[serde(default = "default_force_kill_timeout", with = "duration_serde")]
    pub force_kill_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::default(),
            read_buffer_size: default_read_buffer_size(),
            force_kill_timeout: default_force_kill_timeout(),
        }
    }
}

impl SupervisorConfig {
    pub fn drain_options(&self) -> DrainOptions {
        DrainOptions {
            buffer_size: self.read_buffer_size,
            delivery_mode: self.delivery_mode,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        validation::validate_supervisor_config(self)
    }
}

/// Launcher configuration: which bundled helper to run and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Logical resource name, resolved next to the launcher executable.
    pub helper: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Merged onto the launcher's own environment.
    #[serde(default = "default_environment")]
    pub environment: BTreeMap<String, String>,

    /// Time between SIGTERM and SIGKILL on shutdown.
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl LauncherConfig {
    /// Defaults for `helper`, used when no config file is given.
    pub fn for_helper(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            args: Vec::new(),
            environment: default_environment(),
            grace_period: default_grace_period(),
            log_file: None,
            supervisor: SupervisorConfig::default(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> ConfigResult<Self> {
        let config: LauncherConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        validation::validate_launcher_config(self)
    }
}

/// Parse `"200ms"`, `"5s"`, `"1m"`; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("Invalid duration: {}", s);

    // "ms" before "s"
    if let Some(num) = s.strip_suffix("ms") {
        num.parse().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(num) = s.strip_suffix('s') {
        num.parse().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(num) = s.strip_suffix('m') {
        num.parse::<u64>()
            .ok()
            .and_then(|mins| mins.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse().map(Duration::from_secs).map_err(|_| {
            format!("Duration must be a number or end with 's', 'ms', or 'm': {}", s)
        })
    }
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_force_kill_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_environment() -> BTreeMap<String, String> {
    BTreeMap::from([("RUST_BACKTRACE".to_string(), "1".to_string())])
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() % 1_000_000 != 0 {
            Err(serde::ser::Error::custom(format!(
                "duration {:?} has sub-millisecond precision",
                duration
            )))
        } else if duration.subsec_nanos() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
