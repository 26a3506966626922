/// Guards every path handed to a mutating device command (chmod, rm).
/// A single trailing `/*` wildcard is allowed so permission fixes can target
/// directory contents.
pub fn validate_device_path(path: &str) -> Result<(), String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("device_path is required".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err("device_path must be an absolute device path starting with '/'".to_string());
    }
    if trimmed.contains('\0') || trimmed.contains(['\'', '"', ';', '&', '|', '`', '$']) {
        return Err("device_path contains invalid characters".to_string());
    }
    let base = trimmed.strip_suffix("/*").unwrap_or(trimmed);
    if base.contains('*') {
        return Err("device_path may only end with a single '/*' wildcard".to_string());
    }
    if base.trim_end_matches('/').is_empty() {
        return Err("device_path must not be root".to_string());
    }
    if base.split('/').any(|segment| segment == "..") {
        return Err("device_path must not contain '..' segments".to_string());
    }
    Ok(())
}

/// Quotes a device path for `adb shell`, leaving a trailing wildcard outside
/// the quotes so the device shell still expands it.
pub fn shell_quote_device_path(path: &str) -> String {
    let trimmed = path.trim();
    match trimmed.strip_suffix("/*") {
        Some(base) => format!("'{base}'/*"),
        None => format!("'{trimmed}'"),
    }
}

pub fn join_device_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

pub fn sanitize_filename_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
