//! Controller (app registry) port definition.

use crate::domain::{AppError, AppState, ImageSource};

/// Port for the remote controller's app registry.
///
/// Every call is a blocking remote operation. Semantic refusals surface as
/// `AppError::RemoteRejection`, network trouble as `AppError::RemoteTransient`.
pub trait Controller: Send + Sync {
    /// All apps currently registered.
    fn list_apps(&self) -> Result<Vec<AppState>, AppError>;

    /// Current configuration of one app; `NotFound` rejection when absent.
    fn get_app(&self, name: &str) -> Result<AppState, AppError> {
        self.list_apps()?
            .into_iter()
            .find(|app| app.name == name)
            .ok_or_else(|| AppError::not_found(name))
    }

    /// Register a new, empty app.
    fn create_app(&self, name: &str, has_persistent_data: bool) -> Result<(), AppError>;

    /// Store the complete desired configuration of an existing app.
    fn update_app(&self, state: &AppState) -> Result<(), AppError>;

    /// Remove an app, together with the named volumes listed.
    fn delete_app(&self, name: &str, volumes: &[String]) -> Result<(), AppError>;

    /// Attach a custom domain to an app.
    fn add_domain(&self, name: &str, domain: &str) -> Result<(), AppError>;

    /// Issue a TLS certificate for an attached custom domain.
    fn enable_ssl(&self, name: &str, domain: &str) -> Result<(), AppError>;

    /// Build and roll out a new version of the app.
    fn deploy_image(&self, name: &str, source: &ImageSource) -> Result<(), AppError>;
}

impl<C: Controller + ?Sized> Controller for &C {
    fn list_apps(&self) -> Result<Vec<AppState>, AppError> {
        (**self).list_apps()
    }

    fn get_app(&self, name: &str) -> Result<AppState, AppError> {
        (**self).get_app(name)
    }

    fn create_app(&self, name: &str, has_persistent_data: bool) -> Result<(), AppError> {
        (**self).create_app(name, has_persistent_data)
    }

    fn update_app(&self, state: &AppState) -> Result<(), AppError> {
        (**self).update_app(state)
    }

    fn delete_app(&self, name: &str, volumes: &[String]) -> Result<(), AppError> {
        (**self).delete_app(name, volumes)
    }

    fn add_domain(&self, name: &str, domain: &str) -> Result<(), AppError> {
        (**self).add_domain(name, domain)
    }

    fn enable_ssl(&self, name: &str, domain: &str) -> Result<(), AppError> {
        (**self).enable_ssl(name, domain)
    }

    fn deploy_image(&self, name: &str, source: &ImageSource) -> Result<(), AppError> {
        (**self).deploy_image(name, source)
    }
}
