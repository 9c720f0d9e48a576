use crate::domain::AppError;

/// Port for the explicit go-ahead before a destructive bulk action.
pub trait ConfirmationGate {
    /// Show `matches` and return whether `action` may proceed against all of them.
    fn confirm(&self, action: &str, matches: &[String]) -> Result<bool, AppError>;
}

/// Gate that always proceeds, for automated runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _action: &str, _matches: &[String]) -> Result<bool, AppError> {
        Ok(true)
    }
}
