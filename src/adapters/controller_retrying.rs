//! Retry policy for remote calls and the controller decorator built on it.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::domain::{AppError, AppState, ControllerConfig, ImageSource};
use crate::ports::Controller;

const RETRY_AFTER_TOKEN: &str = "retry_after_ms=";
const MAX_LOG_ERROR_CHARS: usize = 512;
/// Backoff stops doubling after this many retries and only the cap applies.
const MAX_DOUBLINGS: usize = 6;

/// Capped exponential backoff for `AppError::RemoteTransient` failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay_ms: config.retry_delay_ms.max(1),
            max_delay_ms: config.max_delay_ms.max(config.retry_delay_ms),
        }
    }

    /// Wait before the next try. A server `Retry-After` hint wins over the backoff.
    pub fn delay_for_retry(&self, failed_attempt: u32, error: &AppError) -> Duration {
        let delay_ms = match extract_retry_after_ms(error) {
            Some(hint_ms) => hint_ms,
            None => {
                let backoff_ms = (1..failed_attempt)
                    .take(MAX_DOUBLINGS)
                    .fold(self.base_delay_ms, |delay, _| delay.saturating_mul(2))
                    .min(self.max_delay_ms);
                backoff_ms.saturating_add(rand::thread_rng().gen_range(0..=backoff_ms / 4))
            }
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Run `call` until it succeeds, fails for good, or the attempts run out.
    pub fn run<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() || attempt >= self.max_attempts => {
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for_retry(attempt, &error);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %format_error_for_log(&error),
                        "remote call failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Controller decorator applying a [`RetryPolicy`] to every operation.
///
/// Only `AppError::RemoteTransient` is retried; rejections and local errors pass
/// straight through.
pub struct RetryingController<C: Controller> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Controller> RetryingController<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        call: impl Fn(&C) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        self.policy.run(operation, || call(&self.inner))
    }
}

impl<C: Controller> Controller for RetryingController<C> {
    fn list_apps(&self) -> Result<Vec<AppState>, AppError> {
        self.with_retry("list_apps", |inner| inner.list_apps())
    }

    fn get_app(&self, name: &str) -> Result<AppState, AppError> {
        self.with_retry("get_app", |inner| inner.get_app(name))
    }

    fn create_app(&self, name: &str, has_persistent_data: bool) -> Result<(), AppError> {
        self.with_retry("create_app", |inner| inner.create_app(name, has_persistent_data))
    }

    fn update_app(&self, state: &AppState) -> Result<(), AppError> {
        self.with_retry("update_app", |inner| inner.update_app(state))
    }

    fn delete_app(&self, name: &str, volumes: &[String]) -> Result<(), AppError> {
        self.with_retry("delete_app", |inner| inner.delete_app(name, volumes))
    }

    fn add_domain(&self, name: &str, domain: &str) -> Result<(), AppError> {
        self.with_retry("add_domain", |inner| inner.add_domain(name, domain))
    }

    fn enable_ssl(&self, name: &str, domain: &str) -> Result<(), AppError> {
        self.with_retry("enable_ssl", |inner| inner.enable_ssl(name, domain))
    }

    fn deploy_image(&self, name: &str, source: &ImageSource) -> Result<(), AppError> {
        self.with_retry("deploy_image", |inner| inner.deploy_image(name, source))
    }
}

fn extract_retry_after_ms(error: &AppError) -> Option<u64> {
    let message = match error {
        AppError::RemoteTransient { message, .. } => message,
        _ => return None,
    };

    let start = message.find(RETRY_AFTER_TOKEN)? + RETRY_AFTER_TOKEN.len();
    let digits: String =
        message[start..].chars().take_while(|ch| ch.is_ascii_digit()).collect();
    digits.parse::<u64>().ok()
}

fn format_error_for_log(error: &AppError) -> String {
    let raw = error.to_string();
    let mut output: String = raw
        .chars()
        .take(MAX_LOG_ERROR_CHARS)
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if raw.chars().count() > MAX_LOG_ERROR_CHARS {
        output.push_str(" [truncated]");
    }
    output
}
