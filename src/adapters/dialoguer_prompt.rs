//! Terminal prompts backed by dialoguer.

use std::io::ErrorKind;

use dialoguer::{Confirm, Error as DialoguerError, Input};

use crate::domain::AppError;
use crate::domain::token::token_name;
use crate::ports::{ConfirmationGate, VariablePrompter};

/// Asks the operator for bundle variable values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPrompter;

impl VariablePrompter for DialoguerPrompter {
    fn prompt(&self, token: &str) -> Result<String, AppError> {
        self.prompt_with_default(token, None)
    }

    fn prompt_with_default(&self, token: &str, default: Option<&str>) -> Result<String, AppError> {
        let mut input = Input::<String>::new().with_prompt(token_name(token)).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(|err| map_dialoguer_error(err, token))
    }
}

/// Lists the matched apps and asks for a yes/no before a bulk action.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerGate;

impl ConfirmationGate for DialoguerGate {
    fn confirm(&self, action: &str, matches: &[String]) -> Result<bool, AppError> {
        println!("The following {} app(s) match:", matches.len());
        for name in matches {
            println!("  • {}", name);
        }
        Confirm::new()
            .with_prompt(format!("{} {} app(s)?", action, matches.len()))
            .default(false)
            .interact()
            .map_err(|err| map_dialoguer_error(err, action))
    }
}

fn map_dialoguer_error(err: DialoguerError, context: &str) -> AppError {
    match err {
        DialoguerError::IO(io) if io.kind() == ErrorKind::Interrupted => AppError::Cancelled,
        err => AppError::Validation(format!("Failed to read input for '{}': {}", context, err)),
    }
}
