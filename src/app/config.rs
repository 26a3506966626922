use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const DEFAULT_APP_ID: &str = "com.beatgames.beatsaber";
pub const DEFAULT_LOG_FILE_NAME: &str = "logcat.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub adb_command_path: String,
    #[serde(default)]
    pub device_serial: Option<String>,
    #[serde(default)]
    pub logs_dir: String,
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,
    #[serde(default)]
    pub dumps_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

fn default_log_file_name() -> String {
    DEFAULT_LOG_FILE_NAME.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            adb_command_path: String::new(),
            device_serial: None,
            logs_dir: String::new(),
            log_file_name: default_log_file_name(),
            dumps_dir: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Empty `logs_dir` falls back to the platform data directory.
    pub fn resolved_logs_dir(&self) -> PathBuf {
        if !self.logs_dir.trim().is_empty() {
            return PathBuf::from(self.logs_dir.trim());
        }
        data_root().join("logs")
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.resolved_logs_dir().join(&self.log_file_name)
    }

    pub fn resolved_dumps_dir(&self) -> PathBuf {
        if !self.dumps_dir.trim().is_empty() {
            return PathBuf::from(self.dumps_dir.trim());
        }
        match self.resolved_logs_dir().parent() {
            Some(parent) => parent.join("dumps"),
            None => data_root().join("dumps"),
        }
    }
}

fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("modbridge")
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MODBRIDGE_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    home_dir().join(".modbridge_config.json")
}

pub fn backup_config_path() -> PathBuf {
    home_dir().join(".modbridge_config.backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    config.app_id = config.app_id.trim().to_string();
    if config.app_id.is_empty() || config.app_id.contains(char::is_whitespace) {
        config.app_id = default_app_id();
    }
    let file_name = config.log_file_name.trim();
    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        config.log_file_name = default_log_file_name();
    }
    if config.log_level.trim().is_empty() {
        config.log_level = default_log_level();
    }
    config.device_serial = config
        .device_serial
        .map(|serial| serial.trim().to_string())
        .filter(|serial| !serial.is_empty());
    config
}
