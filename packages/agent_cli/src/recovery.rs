//! Configuration steps run by the service before the agent starts.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use logship_agent_service::ConfigRecovery;
use serde::Deserialize;
use toml::{Table, Value};

use crate::settings::{AgentSettings, SettingsError, read_table, upgrade_table, write_table};

/// Settings written by older installers, imported once into the TOML config.
#[derive(Debug, Default, Deserialize)]
struct LegacySettings {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    use_compression: Option<bool>,
    #[serde(default)]
    compression_level: Option<i64>,
}

impl LegacySettings {
    fn apply(self, table: &mut Table) {
        if let Some(api_key) = self.api_key.filter(|k| !k.trim().is_empty()) {
            table.insert("api_key".to_string(), Value::String(api_key));
        }

        if let Some(hostname) = self.hostname {
            table.insert("hostname".to_string(), Value::String(hostname));
        }

        if self.use_compression.is_none() && self.compression_level.is_none() {
            return;
        }

        let logs = table
            .entry("logs".to_string())
            .or_insert_with(|| Value::Table(Table::new()));

        let Value::Table(logs) = logs else {
            tracing::warn!("`logs` entry is not a table, skipping legacy compression settings");
            return;
        };

        if let Some(use_compression) = self.use_compression {
            logs.insert("use_compression".to_string(), Value::Boolean(use_compression));
        }
        if let Some(level) = self.compression_level {
            logs.insert("compression_level".to_string(), Value::Integer(level));
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigFiles {
    config_path: PathBuf,
    legacy_path: PathBuf,
}

impl ConfigFiles {
    pub fn new(config_path: PathBuf, legacy_path: PathBuf) -> Self {
        ConfigFiles {
            config_path,
            legacy_path,
        }
    }

    fn imported_path(&self) -> PathBuf {
        let mut name = self
            .legacy_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("legacy"));
        name.push(".imported");
        self.legacy_path.with_file_name(name)
    }
}

impl ConfigRecovery for ConfigFiles {
    type Error = SettingsError;

    async fn import_legacy_config(&self) -> Result<(), SettingsError> {
        let data = match tokio::fs::read_to_string(&self.legacy_path).await {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.legacy_path.display(), "no legacy settings to import");
                return Ok(());
            }
            Err(error) => return Err(SettingsError::Io(error)),
        };

        let legacy: LegacySettings = serde_json::from_str(&data).map_err(SettingsError::Legacy)?;

        let mut table = read_table(&self.config_path).await?.unwrap_or_default();
        legacy.apply(&mut table);
        write_table(&self.config_path, &table).await?;

        let imported = self.imported_path();
        tokio::fs::rename(&self.legacy_path, &imported).await?;

        tracing::info!(
            from = %self.legacy_path.display(),
            to = %self.config_path.display(),
            "imported legacy settings"
        );
        Ok(())
    }

    async fn upgrade_config(&self) -> Result<(), SettingsError> {
        let Some(mut table) = read_table(&self.config_path).await? else {
            return Ok(());
        };

        if !upgrade_table(&mut table) {
            return Ok(());
        }

        write_table(&self.config_path, &table).await?;
        tracing::info!(path = %self.config_path.display(), "upgraded configuration layout");
        Ok(())
    }
}

pub fn config_files(config_path: &Path, legacy_path: Option<PathBuf>) -> ConfigFiles {
    let legacy_path = legacy_path.unwrap_or_else(|| AgentSettings::legacy_path_for(config_path));
    ConfigFiles::new(config_path.to_path_buf(), legacy_path)
}
