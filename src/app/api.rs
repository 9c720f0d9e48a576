//! API Facade for the application.
//!
//! This module exposes high-level functions that glue together context creation
//! and command execution.

use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::{
    FilesystemTemplateSource, HttpController, HttpTemplateSource, MemoryController, RetryPolicy,
    RetryingController, RetryingTemplateSource,
};
use crate::app::AppContext;
use crate::app::commands::{apps, bulk, one_click};
use crate::ports::{ConfirmationGate, Controller, TemplateSource, VariablePrompter};

pub use crate::app::commands::apps::NewApp;
pub use crate::app::commands::bulk::{ActionResult, BulkAction, BulkOptions, MatchMode};
pub use crate::app::commands::deploy::{
    DeployOptions, DeploymentResult, PollPolicy, RunningStatus, UnitState,
};
pub use crate::app::commands::one_click::{OneClickOutcome, OneClickRequest};
pub use crate::domain::{AppError, AppRemoval, AppState, AppUpdate, Config};

type LiveController = RetryingController<HttpController>;

/// Connect to the configured controller. Login happens on the first call.
fn connect(config: &Config) -> Result<LiveController, AppError> {
    let http = HttpController::new(&config.controller)?;
    Ok(RetryingController::new(http, RetryPolicy::from_config(&config.controller)))
}

/// Create an `AppContext` reading bundles from `template_file` or the configured repository.
fn create_context(
    config: &Config,
    template_file: Option<&PathBuf>,
) -> Result<AppContext<LiveController, Box<dyn TemplateSource>>, AppError> {
    let controller = connect(config)?;
    let templates: Box<dyn TemplateSource> = match template_file {
        Some(_) => Box::new(FilesystemTemplateSource::current()?),
        None => Box::new(RetryingTemplateSource::new(
            HttpTemplateSource::new(
                config.deploy.template_repository.clone(),
                config.controller.timeout_secs,
            )?,
            RetryPolicy::from_config(&config.controller),
        )),
    };
    Ok(AppContext::new(controller, templates))
}

fn deploy_options(config: &Config) -> DeployOptions {
    DeployOptions {
        max_parallel: config.deploy.max_parallel,
        poll: PollPolicy {
            attempts: config.deploy.poll_attempts,
            interval: Duration::from_millis(config.deploy.poll_interval_ms),
        },
    }
}

// =============================================================================
// Deploy Command API
// =============================================================================

/// How a one-click deployment is carried out.
#[derive(Debug, Clone, Default)]
pub struct DeployTarget {
    /// Read the bundle from this local file instead of the template repository.
    pub template_file: Option<PathBuf>,
    /// Run against an in-memory copy of the registry.
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct DeployReport {
    pub outcome: OneClickOutcome,
    /// Mutations a dry run would have performed.
    pub planned: Option<Vec<String>>,
}

/// Deploy a one-click bundle.
pub fn deploy(
    config: Config,
    mut request: OneClickRequest,
    target: &DeployTarget,
    prompter: Option<&dyn VariablePrompter>,
) -> Result<DeployReport, AppError> {
    if let Some(path) = &target.template_file {
        request.bundle = path.to_string_lossy().into_owned();
    }
    if request.root_domain.is_none() {
        request.root_domain = config.deploy.root_domain.clone();
    }
    let options = deploy_options(&config);
    let ctx = create_context(&config, target.template_file.as_ref())?;

    if target.dry_run {
        let preview = MemoryController::seeded(ctx.controller().list_apps()?);
        let outcome =
            one_click::deploy_bundle(&preview, ctx.templates(), &request, prompter, &options)?;
        return Ok(DeployReport { outcome, planned: Some(preview.journal()) });
    }

    let outcome =
        one_click::deploy_bundle(ctx.controller(), ctx.templates(), &request, prompter, &options)?;
    Ok(DeployReport { outcome, planned: None })
}

// =============================================================================
// Single App API
// =============================================================================

pub fn list_apps(config: &Config) -> Result<Vec<AppState>, AppError> {
    connect(config)?.list_apps()
}

/// Create an app, optionally with a custom domain and SSL, then configure it.
pub fn create_app(config: &Config, app: &NewApp) -> Result<AppState, AppError> {
    apps::create_full_app(&connect(config)?, app)
}

/// Remove the listed entries, then merge `update` into the app's configuration.
pub fn update_app(
    config: &Config,
    name: &str,
    removal: &AppRemoval,
    update: &AppUpdate,
) -> Result<AppState, AppError> {
    apps::edit_app(&connect(config)?, name, removal, update)
}

/// Enable HTTPS for `domain`, attaching it first when it is not attached yet.
pub fn enable_ssl(config: &Config, name: &str, domain: &str) -> Result<(), AppError> {
    let controller = connect(config)?;
    let attached = controller.get_app(name)?.custom_domains.iter().any(|d| d == domain);
    if !attached {
        apps::add_domain(&controller, name, domain)?;
    }
    apps::enable_ssl(&controller, name, domain)
}

// =============================================================================
// Bulk API
// =============================================================================

/// Apply `action` to every app whose name matches `pattern`.
pub fn apply_to_matching(
    config: &Config,
    pattern: &str,
    action: &BulkAction,
    mode: MatchMode,
    gate: &dyn ConfirmationGate,
) -> Result<Vec<ActionResult>, AppError> {
    let options = BulkOptions { mode, max_parallel: config.deploy.max_parallel };
    bulk::apply_to_matching(&connect(config)?, pattern, action, gate, &options)
}
