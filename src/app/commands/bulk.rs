//! Apply one action to every app whose name matches a pattern.

use std::fmt;

use regex::Regex;
use tracing::{info, warn};

use crate::app::commands::apps;
use crate::app::commands::pool::run_ordered;
use crate::domain::{AppError, AppUpdate};
use crate::ports::{ConfirmationGate, Controller};

/// How a pattern is matched against app names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// The pattern may match any part of the name.
    #[default]
    Substring,
    /// The pattern must match the whole name.
    Full,
}

impl MatchMode {
    fn compile(self, pattern: &str) -> Result<Regex, AppError> {
        let source = match self {
            MatchMode::Substring => pattern.to_string(),
            MatchMode::Full => format!("^(?:{})$", pattern),
        };
        Regex::new(&source)
            .map_err(|e| AppError::validation(format!("Invalid pattern '{}': {}", pattern, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkAction {
    Delete { delete_volumes: bool },
    Stop,
    Scale(u32),
    Update(AppUpdate),
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkAction::Delete { delete_volumes: true } => f.write_str("Delete (with volumes)"),
            BulkAction::Delete { delete_volumes: false } => f.write_str("Delete"),
            BulkAction::Stop => f.write_str("Stop"),
            BulkAction::Scale(count) => write!(f, "Scale to {} instance(s)", count),
            BulkAction::Update(_) => f.write_str("Update"),
        }
    }
}

impl BulkAction {
    fn run<C: Controller>(&self, controller: &C, name: &str) -> Result<(), AppError> {
        match self {
            BulkAction::Delete { delete_volumes } => {
                apps::delete_app(controller, name, *delete_volumes)
            }
            BulkAction::Stop => apps::stop_app(controller, name).map(|_| ()),
            BulkAction::Scale(count) => apps::scale_app(controller, name, *count).map(|_| ()),
            BulkAction::Update(update) => apps::update_app(controller, name, update).map(|_| ()),
        }
    }
}

/// Outcome of the action on one matched app.
#[derive(Debug)]
pub struct ActionResult {
    pub app_name: String,
    pub error: Option<AppError>,
}

impl ActionResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Names in the registry matching `pattern`, in registry order.
pub fn matching_apps<C: Controller>(
    controller: &C,
    pattern: &str,
    mode: MatchMode,
) -> Result<Vec<String>, AppError> {
    let regex = mode.compile(pattern)?;
    Ok(controller
        .list_apps()?
        .into_iter()
        .map(|app| app.name)
        .filter(|name| regex.is_match(name))
        .collect())
}

/// Options for [`apply_to_matching`].
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    pub mode: MatchMode,
    pub max_parallel: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { mode: MatchMode::Substring, max_parallel: 1 }
    }
}

/// Run `action` against every matching app.
///
/// Returns an empty list when nothing matches. Nothing runs until `gate` approves
/// the match set; a refusal yields [`AppError::Cancelled`].
pub fn apply_to_matching<C: Controller>(
    controller: &C,
    pattern: &str,
    action: &BulkAction,
    gate: &dyn ConfirmationGate,
    options: &BulkOptions,
) -> Result<Vec<ActionResult>, AppError> {
    let matches = matching_apps(controller, pattern, options.mode)?;
    if matches.is_empty() {
        info!(%pattern, "no apps match");
        return Ok(Vec::new());
    }

    if !gate.confirm(&action.to_string(), &matches)? {
        return Err(AppError::Cancelled);
    }

    let results = run_ordered(&matches, options.max_parallel, |name| {
        let error = action.run(controller, name).err();
        if let Some(err) = &error {
            warn!(app = %name, error = %err, "bulk action failed");
        }
        ActionResult { app_name: name.clone(), error }
    });

    let failed = results.iter().filter(|result| !result.succeeded()).count();
    info!(action = %action, matched = results.len(), failed, "bulk action finished");
    Ok(results)
}
