//! Retry decorator for template repositories.

use url::Url;

use crate::adapters::RetryPolicy;
use crate::domain::AppError;
use crate::ports::TemplateSource;

/// Template source that repeats transient fetch failures under a [`RetryPolicy`].
pub struct RetryingTemplateSource<T: TemplateSource> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: TemplateSource> RetryingTemplateSource<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T: TemplateSource> TemplateSource for RetryingTemplateSource<T> {
    fn fetch_template(&self, bundle: &str, repository: Option<&Url>) -> Result<String, AppError> {
        self.policy.run("fetch_template", || self.inner.fetch_template(bundle, repository))
    }
}
