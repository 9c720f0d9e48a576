//! Single-app operations. Every configuration change goes through the merge engine.

use tracing::info;

use crate::domain::{AppError, AppRemoval, AppState, AppUpdate, merge, prune};
use crate::ports::Controller;

/// Merge `update` into the app's current configuration and push the result.
pub fn update_app<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    update: &AppUpdate,
) -> Result<AppState, AppError> {
    let current = controller.get_app(name)?;
    let next = merge(&current, update);
    controller.update_app(&next)?;
    info!(app = %name, "configuration updated");
    Ok(next)
}

/// Apply explicit removals, then an additive update, in a single controller call.
pub fn edit_app<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    removal: &AppRemoval,
    update: &AppUpdate,
) -> Result<AppState, AppError> {
    let current = controller.get_app(name)?;
    let next = merge(&prune(&current, removal), update);
    controller.update_app(&next)?;
    info!(app = %name, "configuration updated");
    Ok(next)
}

pub fn scale_app<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    instance_count: u32,
) -> Result<AppState, AppError> {
    update_app(controller, name, &AppUpdate::scale(instance_count))
}

/// Scale to zero instances. Configuration and data are kept.
pub fn stop_app<C: Controller + ?Sized>(controller: &C, name: &str) -> Result<AppState, AppError> {
    update_app(controller, name, &AppUpdate::stop())
}

/// Delete an app, optionally along with its named volumes.
pub fn delete_app<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    delete_volumes: bool,
) -> Result<(), AppError> {
    let volumes = if delete_volumes { controller.get_app(name)?.volume_names() } else { Vec::new() };
    controller.delete_app(name, &volumes)?;
    info!(app = %name, volumes = volumes.len(), "deleted");
    Ok(())
}

/// Turn on HTTPS for a domain already attached to the app.
pub fn enable_ssl<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    domain: &str,
) -> Result<(), AppError> {
    controller.enable_ssl(name, domain)?;
    info!(app = %name, %domain, "ssl enabled");
    Ok(())
}

pub fn add_domain<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    domain: &str,
) -> Result<(), AppError> {
    controller.add_domain(name, domain)?;
    info!(app = %name, %domain, "domain attached");
    Ok(())
}

/// Register an app and attach a custom domain to it.
pub fn create_app_with_custom_domain<C: Controller + ?Sized>(
    controller: &C,
    name: &str,
    has_persistent_data: bool,
    domain: &str,
) -> Result<(), AppError> {
    controller.create_app(name, has_persistent_data)?;
    add_domain(controller, name, domain)
}

/// Parameters for [`create_full_app`].
#[derive(Debug, Clone, Default)]
pub struct NewApp {
    pub name: String,
    pub has_persistent_data: bool,
    pub domain: Option<String>,
    pub enable_ssl: bool,
    pub update: AppUpdate,
}

/// Create, attach domain, enable SSL, then apply the configuration update.
///
/// Stops at the first failing step; earlier steps are not rolled back.
pub fn create_full_app<C: Controller + ?Sized>(
    controller: &C,
    app: &NewApp,
) -> Result<AppState, AppError> {
    if app.enable_ssl && app.domain.is_none() {
        return Err(AppError::validation("Enabling SSL requires a custom domain"));
    }

    match &app.domain {
        Some(domain) => {
            create_app_with_custom_domain(controller, &app.name, app.has_persistent_data, domain)?;
            if app.enable_ssl {
                enable_ssl(controller, &app.name, domain)?;
            }
        }
        None => controller.create_app(&app.name, app.has_persistent_data)?,
    }
    info!(app = %app.name, "created");

    if app.update.is_empty() {
        return controller.get_app(&app.name);
    }
    update_app(controller, &app.name, &app.update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnvVar, RejectionKind, Volume};
    use crate::testing::RecordingController;

    fn seeded() -> RecordingController {
        let mut app = AppState::new("blog", true);
        app.env_vars = vec![EnvVar::new("A", "1"), EnvVar::new("B", "2")];
        app.volumes = vec![Volume::named("blog-data", "/data"), Volume::host_path("/srv/x", "/x")];
        RecordingController::with_states(vec![app])
    }

    #[test]
    fn update_keeps_unmentioned_fields() {
        let controller = seeded();
        let update = AppUpdate { env_vars: vec![EnvVar::new("C", "3")], ..AppUpdate::default() };

        let next = update_app(&controller, "blog", &update).unwrap();

        assert_eq!(next.env_vars.len(), 3);
        assert_eq!(next.volumes.len(), 2);
        assert_eq!(controller.app("blog").unwrap(), next);
    }

    #[test]
    fn edit_removes_only_named_keys() {
        let controller = seeded();
        let removal = AppRemoval { env_keys: vec!["A".into()], ..AppRemoval::default() };

        let next = edit_app(&controller, "blog", &removal, &AppUpdate::default()).unwrap();

        assert_eq!(next.env_vars, vec![EnvVar::new("B", "2")]);
        assert_eq!(controller.mutations(), vec!["update:blog"]);
    }

    #[test]
    fn stop_and_scale_only_touch_instances() {
        let controller = seeded();
        assert_eq!(stop_app(&controller, "blog").unwrap().instance_count, 0);
        let scaled = scale_app(&controller, "blog", 3).unwrap();
        assert_eq!(scaled.instance_count, 3);
        assert_eq!(scaled.env_vars.len(), 2);
    }

    #[test]
    fn delete_with_volumes_passes_named_volumes_only() {
        let controller = seeded();
        delete_app(&controller, "blog", true).unwrap();
        assert_eq!(controller.mutations(), vec!["delete+volumes:blog"]);
        assert!(controller.app("blog").is_none());
    }

    #[test]
    fn missing_app_update_is_not_found() {
        let controller = RecordingController::new();
        let err = update_app(&controller, "ghost", &AppUpdate::scale(1)).unwrap_err();
        assert!(err.is_rejection(RejectionKind::NotFound));
        assert!(controller.mutations().is_empty());
    }

    #[test]
    fn full_app_runs_steps_in_order() {
        let controller = RecordingController::new();
        let app = NewApp {
            name: "shop".into(),
            has_persistent_data: false,
            domain: Some("shop.example.com".into()),
            enable_ssl: true,
            update: AppUpdate::scale(2),
        };

        let state = create_full_app(&controller, &app).unwrap();

        assert_eq!(
            controller.mutations(),
            vec!["create:shop", "domain:shop", "ssl:shop", "update:shop"]
        );
        assert_eq!(state.instance_count, 2);
        assert_eq!(state.custom_domains, vec!["shop.example.com".to_string()]);
    }

    #[test]
    fn ssl_without_domain_is_rejected_locally() {
        let controller = RecordingController::new();
        let app = NewApp { name: "shop".into(), enable_ssl: true, ..NewApp::default() };

        assert!(matches!(create_full_app(&controller, &app), Err(AppError::Validation(_))));
        assert!(controller.calls().is_empty());
    }

    #[test]
    fn ssl_on_unattached_domain_fails() {
        let controller = seeded();
        let err = enable_ssl(&controller, "blog", "blog.example.com").unwrap_err();
        assert!(err.is_rejection(RejectionKind::DomainNotVerified));
    }
}
