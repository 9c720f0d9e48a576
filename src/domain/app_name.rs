//! Controller naming rules for apps.

use crate::domain::AppError;

pub const MAX_APP_NAME_LEN: usize = 50;

/// Validates an app name.
///
/// Checks:
/// - Non-empty and at most [`MAX_APP_NAME_LEN`] characters
/// - Lowercase ASCII letters, digits and '-'
/// - No leading, trailing or doubled '-'
pub fn is_valid_app_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_APP_NAME_LEN {
        return false;
    }
    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return false;
    }
    name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

pub fn validate_app_name(name: &str) -> Result<(), AppError> {
    if is_valid_app_name(name) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Invalid app name '{}': use up to {} lowercase letters, digits and single hyphens",
            name, MAX_APP_NAME_LEN
        )))
    }
}

/// Turn arbitrary text into a valid app name, or fail if nothing usable remains.
pub fn sanitize_app_name(raw: &str) -> Result<String, AppError> {
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            name.push(c);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }

    let mut name = name.trim_matches('-').to_string();
    if name.len() > MAX_APP_NAME_LEN {
        name.truncate(MAX_APP_NAME_LEN);
        name = name.trim_end_matches('-').to_string();
    }

    validate_app_name(&name).map_err(|_| {
        AppError::validation(format!("Cannot derive a valid app name from '{}'", raw))
    })?;
    Ok(name)
}

/// `<service-key>-<namespace>`, sanitized.
pub fn derive_app_name(service_key: &str, namespace: &str) -> Result<String, AppError> {
    sanitize_app_name(&format!("{}-{}", service_key, namespace))
}
