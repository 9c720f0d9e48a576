use std::fmt;
use std::io;

use thiserror::Error;

/// Semantic rejection classes returned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    AlreadyExists,
    NotFound,
    DomainNotVerified,
    Validation,
    Other,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectionKind::AlreadyExists => "already exists",
            RejectionKind::NotFound => "not found",
            RejectionKind::DomainNotVerified => "domain not verified",
            RejectionKind::Validation => "validation failed",
            RejectionKind::Other => "rejected",
        };
        f.write_str(label)
    }
}

/// Library-wide error type for capdeploy operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Configuration or environment issue.
    #[error("{0}")]
    Configuration(String),

    /// Configuration values failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Required environment variable is not set.
    #[error("Environment variable '{0}' is not set")]
    EnvironmentVariableMissing(String),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The bundle document is not well-formed structured data.
    #[error("Failed to parse bundle document: {0}")]
    TemplateParse(String),

    /// A placeholder token has no value source.
    #[error("No value available for variable '{token}'")]
    VariableMissing { token: String },

    /// Two or more services resolve to the same app name.
    #[error("App name '{app_name}' is claimed by more than one service: {}", services.join(", "))]
    NamingConflict { app_name: String, services: Vec<String> },

    /// Local validation failed before any remote call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or timeout failure talking to the controller.
    #[error("Controller request failed: {message}")]
    RemoteTransient { message: String, status: Option<u16> },

    /// The controller refused the request.
    #[error("Controller rejected request ({kind}): {message}")]
    RemoteRejection { kind: RejectionKind, message: String },

    /// The operator declined a confirmation or aborted a prompt.
    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    pub fn rejection<S: Into<String>>(kind: RejectionKind, message: S) -> Self {
        AppError::RemoteRejection { kind, message: message.into() }
    }

    pub fn not_found(app_name: &str) -> Self {
        AppError::rejection(RejectionKind::NotFound, format!("App '{}' not found", app_name))
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::RemoteTransient { .. })
    }

    pub fn is_rejection(&self, expected: RejectionKind) -> bool {
        matches!(self, AppError::RemoteRejection { kind, .. } if *kind == expected)
    }

    /// Provide an `io::ErrorKind`-like view for callers mapping errors to exit codes.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            AppError::Io(err) => err.kind(),
            AppError::Configuration(_)
            | AppError::InvalidConfig(_)
            | AppError::TomlParse(_)
            | AppError::TemplateParse(_)
            | AppError::VariableMissing { .. }
            | AppError::NamingConflict { .. }
            | AppError::Validation(_) => io::ErrorKind::InvalidInput,
            AppError::EnvironmentVariableMissing(_) => io::ErrorKind::NotFound,
            AppError::RemoteTransient { .. } => io::ErrorKind::TimedOut,
            AppError::RemoteRejection { kind, .. } => match kind {
                RejectionKind::AlreadyExists => io::ErrorKind::AlreadyExists,
                RejectionKind::NotFound => io::ErrorKind::NotFound,
                RejectionKind::Validation => io::ErrorKind::InvalidInput,
                RejectionKind::DomainNotVerified | RejectionKind::Other => {
                    io::ErrorKind::PermissionDenied
                }
            },
            AppError::Cancelled => io::ErrorKind::Interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_remote_transient_is_retryable() {
        let transient = AppError::RemoteTransient { message: "timed out".into(), status: None };
        assert!(transient.is_transient());

        assert!(!AppError::validation("bad port").is_transient());
        assert!(
            !AppError::NamingConflict { app_name: "web".into(), services: vec![] }.is_transient()
        );
        assert!(!AppError::not_found("web").is_transient());
    }

    #[test]
    fn naming_conflict_lists_services() {
        let err = AppError::NamingConflict {
            app_name: "web-shop".into(),
            services: vec!["web".into(), "web_".into()],
        };
        assert_eq!(
            err.to_string(),
            "App name 'web-shop' is claimed by more than one service: web, web_"
        );
    }

    #[test]
    fn rejection_kind_maps_to_io_kind() {
        assert_eq!(AppError::not_found("x").kind(), io::ErrorKind::NotFound);
        assert_eq!(
            AppError::rejection(RejectionKind::AlreadyExists, "dup").kind(),
            io::ErrorKind::AlreadyExists
        );
        assert!(AppError::not_found("x").is_rejection(RejectionKind::NotFound));
    }
}
