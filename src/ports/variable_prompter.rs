use crate::domain::AppError;

/// Port for soliciting a variable value from the operator.
pub trait VariablePrompter {
    /// Ask for the value of `token`.
    fn prompt(&self, token: &str) -> Result<String, AppError>;

    /// Ask for the value of `token`, falling back to `default` on an empty answer.
    fn prompt_with_default(&self, token: &str, default: Option<&str>) -> Result<String, AppError> {
        let answer = self.prompt(token)?;
        match default {
            Some(default) if answer.is_empty() => Ok(default.to_string()),
            _ => Ok(answer),
        }
    }
}
