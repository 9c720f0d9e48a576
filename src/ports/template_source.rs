use url::Url;

use crate::domain::AppError;

/// Port for fetching raw one-click app definitions.
pub trait TemplateSource {
    /// Raw document text for `bundle`, optionally from a different repository.
    fn fetch_template(&self, bundle: &str, repository: Option<&Url>) -> Result<String, AppError>;
}

impl<T: TemplateSource + ?Sized> TemplateSource for Box<T> {
    fn fetch_template(&self, bundle: &str, repository: Option<&Url>) -> Result<String, AppError> {
        (**self).fetch_template(bundle, repository)
    }
}
