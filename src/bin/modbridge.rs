use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use modbridge_lib::app::adapters::{
    AutoConfirm, ConfirmationPrompt, StdinPrompt, SystemDirectoryOpener, TracingNotificationSink,
};
use modbridge_lib::app::adb::channel::{resolve_adb_program, validate_adb_program};
use modbridge_lib::app::config::{load_config, load_config_from_path, AppConfig};
use modbridge_lib::app::logging::init_logging;
use modbridge_lib::app::models::{WorkflowKind, WorkflowOutcome};
use modbridge_lib::{AppError, OperationLock, Orchestrator};
use serde::Serialize;
use uuid::Uuid;

const USAGE: &str = "Usage: modbridge <uninstall|quick-fix|remove-mod-dirs|fix-permissions|toggle-log|restart|dump> [--config PATH] [--serial SERIAL] [--yes]\n       modbridge log <SECONDS> [--config PATH] [--serial SERIAL]\n";

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Workflow(WorkflowKind),
    /// Streams the device log for a fixed time, then stops.
    Log(Duration),
}

#[derive(Debug, Clone)]
struct Args {
    action: Action,
    config_path: Option<PathBuf>,
    serial: Option<String>,
    assume_yes: bool,
}

#[derive(Serialize)]
struct RunSummary {
    tool: &'static str,
    workflow: String,
    status: &'static str, // ok|declined|fail
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<WorkflowOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<AppError>,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut action: Option<Action> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut assume_yes = false;

    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--yes" | "-y" => {
                assume_yes = true;
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            "log" if action.is_none() => {
                let seconds = it
                    .next()
                    .ok_or_else(|| "log requires a duration in seconds".to_string())?;
                let seconds: u64 = seconds
                    .parse()
                    .map_err(|_| format!("Invalid duration: {seconds}"))?;
                action = Some(Action::Log(Duration::from_secs(seconds)));
            }
            other if action.is_none() => {
                let kind = WorkflowKind::from_cli_name(other)
                    .ok_or_else(|| format!("Unknown workflow: {other}\n{USAGE}"))?;
                action = Some(Action::Workflow(kind));
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        action: action.ok_or_else(|| USAGE.to_string())?,
        config_path,
        serial,
        assume_yes,
    })
}

fn resolve_config(args: &Args, trace_id: &str) -> Result<AppConfig, AppError> {
    let mut config = match &args.config_path {
        Some(path) => load_config_from_path(path, trace_id)?,
        None => load_config(trace_id)?,
    };
    if args.serial.is_some() {
        config.device_serial = args.serial.clone();
    }
    Ok(config)
}

fn summarize(workflow: &str, result: Result<WorkflowOutcome, AppError>) -> RunSummary {
    match result {
        Ok(WorkflowOutcome::Declined) => RunSummary {
            tool: "modbridge",
            workflow: workflow.to_string(),
            status: "declined",
            outcome: Some(WorkflowOutcome::Declined),
            error: None,
        },
        Ok(outcome) => RunSummary {
            tool: "modbridge",
            workflow: workflow.to_string(),
            status: "ok",
            outcome: Some(outcome),
            error: None,
        },
        Err(err) => RunSummary {
            tool: "modbridge",
            workflow: workflow.to_string(),
            status: "fail",
            outcome: None,
            error: Some(err),
        },
    }
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match resolve_config(&args, &trace_id).and_then(|config| {
        validate_adb_program(&resolve_adb_program(&config.adb_command_path))
            .map(|_| config)
            .map_err(|message| AppError::validation(message, trace_id.as_str()))
    }) {
        Ok(config) => config,
        Err(err) => {
            init_logging("info");
            let summary = summarize("load_config", Err(err));
            println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level);

    let prompt: Arc<dyn ConfirmationPrompt> = if args.assume_yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(StdinPrompt)
    };
    let orchestrator = Orchestrator::from_config(
        &config,
        Arc::new(OperationLock::new()),
        prompt,
        Arc::new(TracingNotificationSink),
        Arc::new(SystemDirectoryOpener),
    );

    let (name, result) = match args.action {
        Action::Workflow(kind) => (kind.cli_name(), orchestrator.run(kind).await),
        Action::Log(duration) => {
            let result = match orchestrator.toggle_log().await {
                Ok(_) => {
                    tokio::time::sleep(duration).await;
                    if orchestrator.is_streaming() {
                        orchestrator.toggle_log().await
                    } else {
                        // the device went away before the time was up
                        Ok(WorkflowOutcome::done())
                    }
                }
                Err(err) => Err(err),
            };
            ("log", result)
        }
    };

    let failed = result.is_err();
    let summary = summarize(name, result);
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
    if failed {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, String> {
        parse_args(raw.iter().map(|value| value.to_string()))
    }

    #[test]
    fn parses_workflow_with_flags() {
        let parsed = args(&["restart", "--serial", "1WMHH", "--yes"]).expect("args");
        assert_eq!(parsed.action, Action::Workflow(WorkflowKind::RestartApp));
        assert_eq!(parsed.serial.as_deref(), Some("1WMHH"));
        assert!(parsed.assume_yes);
    }

    #[test]
    fn parses_log_duration() {
        let parsed = args(&["log", "30", "--config", "/tmp/mb.json"]).expect("args");
        assert_eq!(parsed.action, Action::Log(Duration::from_secs(30)));
        assert_eq!(parsed.config_path, Some(PathBuf::from("/tmp/mb.json")));
    }

    #[test]
    fn rejects_unknown_and_missing_workflow() {
        assert!(args(&["reboot"]).unwrap_err().contains("Unknown workflow"));
        assert!(args(&["--yes"]).unwrap_err().starts_with("Usage"));
        assert!(args(&["dump", "restart"]).unwrap_err().contains("Unknown arg"));
        assert!(args(&["log", "soon"]).unwrap_err().contains("Invalid duration"));
    }
}
