use std::fs;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use zip::write::FileOptions;

use crate::app::adapters::DumpCreator;
use crate::app::adb::channel::{AdbChannel, CommandChannel, DeviceCommand};
use crate::app::adb::parse::parse_adb_devices;
use crate::app::adb::paths::sanitize_filename_component;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::DeviceSummary;

#[derive(Debug, Serialize)]
struct DumpManifest {
    app_version: &'static str,
    os: &'static str,
    arch: &'static str,
    timestamp_utc: String,
    trace_id: String,
    app_id: String,
}

#[derive(Debug, Default, Serialize)]
struct CapturedCommand {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DumpPayload {
    manifest: DumpManifest,
    devices: Vec<DeviceSummary>,
    devices_raw: CapturedCommand,
    package_info: CapturedCommand,
    log_file_included: bool,
}

/// Builds a zip bundle with a JSON summary of the host/device state and the
/// current log file, if any.
#[derive(Debug, Clone)]
pub struct DiagnosticsDumpCreator {
    adb: AdbChannel,
    app_id: String,
    dumps_dir: PathBuf,
    log_file: PathBuf,
}

impl DiagnosticsDumpCreator {
    pub fn new(adb: AdbChannel, app_id: impl Into<String>, dumps_dir: PathBuf, log_file: PathBuf) -> Self {
        Self {
            adb,
            app_id: app_id.into(),
            dumps_dir,
            log_file,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            AdbChannel::from_config(config),
            config.app_id.clone(),
            config.resolved_dumps_dir(),
            config.log_file_path(),
        )
    }

    async fn capture_devices(&self, trace_id: &str) -> CapturedCommand {
        match self.adb.run_host(&["devices", "-l"], trace_id).await {
            Ok(output) => CapturedCommand {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
                error: None,
            },
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to list devices for dump");
                CapturedCommand {
                    error: Some(err.error),
                    ..CapturedCommand::default()
                }
            }
        }
    }

    async fn capture_package_info(&self, trace_id: &str) -> CapturedCommand {
        let command = DeviceCommand::Shell(format!("dumpsys package {}", self.app_id));
        match self.adb.run(&command, trace_id).await {
            Ok(output) => CapturedCommand {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
                error: None,
            },
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to capture package info for dump");
                CapturedCommand {
                    error: Some(err.error),
                    ..CapturedCommand::default()
                }
            }
        }
    }
}

#[async_trait]
impl DumpCreator for DiagnosticsDumpCreator {
    async fn create(&self, trace_id: &str) -> Result<PathBuf, AppError> {
        let devices_raw = self.capture_devices(trace_id).await;
        let package_info = self.capture_package_info(trace_id).await;
        let log_bytes = match tokio::fs::read(&self.log_file).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to read log file for dump");
                None
            }
        };

        let payload = DumpPayload {
            manifest: DumpManifest {
                app_version: env!("CARGO_PKG_VERSION"),
                os: std::env::consts::OS,
                arch: std::env::consts::ARCH,
                timestamp_utc: Utc::now().to_rfc3339(),
                trace_id: trace_id.to_string(),
                app_id: self.app_id.clone(),
            },
            devices: parse_adb_devices(&devices_raw.stdout),
            devices_raw,
            package_info,
            log_file_included: log_bytes.is_some(),
        };
        let json = serde_json::to_vec_pretty(&payload).map_err(|err| {
            AppError::system(format!("Failed to serialize dump payload: {err}"), trace_id)
        })?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let trace_short = sanitize_filename_component(trace_id)
            .chars()
            .take(8)
            .collect::<String>();
        let filename = format!(
            "dump_{}_{}_{}.zip",
            sanitize_filename_component(&self.app_id),
            timestamp,
            trace_short
        );
        let dumps_dir = self.dumps_dir.clone();
        let log_name = self
            .log_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "logcat.log".to_string());
        let owned_trace = trace_id.to_string();

        let bundle_path = tokio::task::spawn_blocking(move || {
            write_bundle(dumps_dir, filename, json, log_name, log_bytes, &owned_trace)
        })
        .await
        .map_err(|err| AppError::system(format!("Dump writer task failed: {err}"), trace_id))??;

        info!(trace_id = %trace_id, path = %bundle_path.display(), "dump created");
        Ok(bundle_path)
    }
}

fn write_bundle(
    dumps_dir: PathBuf,
    filename: String,
    json: Vec<u8>,
    log_name: String,
    log_bytes: Option<Vec<u8>>,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(&dumps_dir).map_err(|err| {
        AppError::system(format!("Failed to create dump dir: {err}"), trace_id)
    })?;
    let bundle_path = dumps_dir.join(filename);
    let file = fs::File::create(&bundle_path)
        .map_err(|err| AppError::system(format!("Failed to create dump: {err}"), trace_id))?;
    let write_err = |err: &dyn std::fmt::Display| {
        AppError::system(format!("Failed to write dump: {err}"), trace_id)
    };

    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("dump.json", FileOptions::<()>::default())
        .map_err(|err| write_err(&err))?;
    zip.write_all(&json).map_err(|err| write_err(&err))?;
    if let Some(bytes) = log_bytes {
        zip.start_file(log_name, FileOptions::<()>::default())
            .map_err(|err| write_err(&err))?;
        zip.write_all(&bytes).map_err(|err| write_err(&err))?;
    }
    zip.finish()
        .map_err(|err| AppError::system(format!("Failed to finalize dump: {err}"), trace_id))?;
    Ok(bundle_path)
}
