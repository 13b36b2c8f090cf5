use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// evdev node of the keyboard to read. Auto-detected when unset.
    #[serde(default)]
    pub keyboard: Option<PathBuf>,
    /// Name of the virtual pointer device. Also used to skip that device
    /// during keyboard detection.
    #[serde(default = "DeviceConfig::default_name")]
    pub name: String,
}

impl DeviceConfig {
    fn default_name() -> String { "mowz".into() }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            keyboard: None,
            name: "mowz".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "DaemonConfig::default_pid_file")]
    pub pid_file: PathBuf,
    /// Where logs go once the daemon has detached from its terminal.
    #[serde(default = "DaemonConfig::default_log_file")]
    pub log_file: PathBuf,
}

impl DaemonConfig {
    fn default_pid_file() -> PathBuf { PathBuf::from("/run/mowz.pid") }
    fn default_log_file() -> PathBuf { PathBuf::from("/var/log/mowz.log") }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: Self::default_pid_file(),
            log_file: Self::default_log_file(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("mowz")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "parsing config TOML")
    }

    /// PID file location. `MOWZ_PID_FILE` overrides the configured path.
    pub fn pid_file(&self) -> PathBuf {
        if let Ok(path) = std::env::var("MOWZ_PID_FILE") {
            return PathBuf::from(path);
        }
        self.daemon.pid_file.clone()
    }
}
