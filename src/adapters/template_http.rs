//! One-click app repository client.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use crate::domain::{AppError, RejectionKind};
use crate::ports::TemplateSource;

/// Fetches `<repository>/v4/apps/<bundle>.yml` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTemplateSource {
    repository: Url,
    client: Client,
}

impl HttpTemplateSource {
    pub fn new(repository: Url, timeout_secs: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::config_error(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { repository, client })
    }

    fn bundle_url(repository: &Url, bundle: &str) -> Result<Url, AppError> {
        if bundle.is_empty() || !bundle.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(AppError::validation(format!("Invalid bundle name '{}'", bundle)));
        }
        let joined =
            format!("{}/v4/apps/{}.yml", repository.as_str().trim_end_matches('/'), bundle);
        Url::parse(&joined)
            .map_err(|e| AppError::validation(format!("Invalid bundle url '{}': {}", joined, e)))
    }
}

impl TemplateSource for HttpTemplateSource {
    fn fetch_template(&self, bundle: &str, repository: Option<&Url>) -> Result<String, AppError> {
        let url = Self::bundle_url(repository.unwrap_or(&self.repository), bundle)?;
        debug!(%url, "fetching bundle");

        let response = self.client.get(url.clone()).send().map_err(|e| {
            AppError::RemoteTransient { message: format!("HTTP request failed: {}", e), status: None }
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AppError::rejection(
                RejectionKind::NotFound,
                format!("Bundle '{}' not found at {}", bundle, url),
            ));
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AppError::RemoteTransient {
                message: format!("Template repository responded with HTTP {}", status.as_u16()),
                status: Some(status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(AppError::rejection(
                RejectionKind::Other,
                format!("Template repository responded with HTTP {}", status.as_u16()),
            ));
        }

        response.text().map_err(|e| AppError::RemoteTransient {
            message: format!("Failed to read bundle body: {}", e),
            status: None,
        })
    }
}
