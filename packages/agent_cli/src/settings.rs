use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use logship_logs_client::CompressionSettings;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

pub const CURRENT_CONFIG_VERSION: i64 = 2;

const CONFIG_FILE_NAME: &str = "logship.toml";
const LEGACY_FILE_NAME: &str = "logship.json";

/* keys that lived at the top level before the [logs] section existed */
const V1_LOGS_KEYS: [&str; 2] = ["use_compression", "compression_level"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "current_config_version")]
    pub config_version: i64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub logs: LogsSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsSettings {
    #[serde(flatten)]
    pub compression: CompressionSettings,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

fn current_config_version() -> i64 {
    CURRENT_CONFIG_VERSION
}

fn default_status_interval_secs() -> u64 {
    60
}

impl Default for LogsSettings {
    fn default() -> Self {
        LogsSettings {
            compression: CompressionSettings::default(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl AgentSettings {
    /// Loads the settings, upgrading an old layout in memory if the file on
    /// disk has not been upgraded yet.
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut table = read_table(path)
            .await?
            .ok_or_else(|| SettingsError::Missing(path.to_path_buf()))?;

        if upgrade_table(&mut table) {
            tracing::warn!(path = %path.display(), "configuration uses an old layout, run the service to upgrade it");
        }

        Value::Table(table).try_into().map_err(SettingsError::Parse)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty())
    }

    pub async fn default_path() -> PathBuf {
        if tokio::fs::try_exists(CONFIG_FILE_NAME).await.unwrap_or(false) {
            return PathBuf::from(CONFIG_FILE_NAME);
        }

        let Some(config_root) = dirs::config_local_dir() else {
            return PathBuf::from(CONFIG_FILE_NAME);
        };

        config_root.join("logship").join(CONFIG_FILE_NAME)
    }

    /// Legacy settings are looked up next to the configuration file.
    pub fn legacy_path_for(config_path: &Path) -> PathBuf {
        config_path.with_file_name(LEGACY_FILE_NAME)
    }
}

/// Moves a configuration table to the current layout. Returns false when the
/// table already is current.
pub fn upgrade_table(table: &mut Table) -> bool {
    let version = table
        .get("config_version")
        .and_then(Value::as_integer)
        .unwrap_or(1);

    if version >= CURRENT_CONFIG_VERSION {
        return false;
    }

    let mut logs = match table.remove("logs") {
        Some(Value::Table(logs)) => logs,
        Some(other) => {
            tracing::warn!(value = %other, "dropping `logs` entry that is not a table");
            Table::new()
        }
        None => Table::new(),
    };

    for key in V1_LOGS_KEYS {
        if let Some(value) = table.remove(key) {
            logs.entry(key.to_string()).or_insert(value);
        }
    }

    table.insert("logs".to_string(), Value::Table(logs));
    table.insert("config_version".to_string(), Value::Integer(CURRENT_CONFIG_VERSION));
    true
}

pub async fn read_table(path: &Path) -> Result<Option<Table>, SettingsError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(SettingsError::Io(error)),
    };

    toml::from_str(&data).map(Some).map_err(SettingsError::Parse)
}

pub async fn write_table(path: &Path, table: &Table) -> Result<(), SettingsError> {
    let data = toml::to_string_pretty(table).map_err(SettingsError::Serialize)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(SettingsError::Io)?;
    }

    tokio::fs::write(path, data).await.map_err(SettingsError::Io)
}

#[derive(Debug)]
pub enum SettingsError {
    Missing(PathBuf),
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Legacy(serde_json::Error),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Missing(path) => write!(f, "settings file not found: {}", path.display()),
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Parse(e) => write!(f, "invalid settings: {}", e),
            SettingsError::Serialize(e) => write!(f, "failed to serialize settings: {}", e),
            SettingsError::Legacy(e) => write!(f, "invalid legacy settings: {}", e),
        }
    }
}

impl Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}
