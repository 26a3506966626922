use std::sync::OnceLock;

use regex::Regex;

use crate::app::adb::paths::join_device_path;
use crate::app::models::{DeviceFileEntry, DeviceSummary};

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?.to_string();
            let state = tokens.next()?.to_string();
            let mut summary = DeviceSummary {
                serial,
                state,
                model: None,
                product: None,
                device: None,
                transport_id: None,
            };
            for token in tokens {
                if let Some(value) = token.strip_prefix("model:") {
                    summary.model = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("product:") {
                    summary.product = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("device:") {
                    summary.device = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("transport_id:") {
                    summary.transport_id = Some(value.to_string());
                }
            }
            Some(summary)
        })
        .collect()
}

/// Parses `ls -1` output. A directory that does not exist lists as empty.
pub fn parse_ls_output(dir: &str, output: &str) -> Vec<DeviceFileEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("total "))
        .filter(|line| !line.contains("No such file or directory"))
        .filter(|line| *line != "." && *line != "..")
        .map(|name| DeviceFileEntry {
            name: name.to_string(),
            path: join_device_path(dir, name),
        })
        .collect()
}

/// `am` and `pm` report many failures on stdout with a zero exit code.
pub fn detect_shell_failure(output: &str) -> Option<String> {
    static FAILURE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = FAILURE_RE
        .get_or_init(|| Regex::new(r"(?m)^\s*(Error(?: type \d+)?:.*|Failure(?: \[.*\])?.*|Exception occurred.*)$").ok())
        .as_ref()?;
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().trim().to_string())
}
