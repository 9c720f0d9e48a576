//! One-click bundle pipeline: fetch, resolve, translate, deploy.
//!
//! Resolution and translation finish before the first controller call, so a
//! missing variable or a naming conflict never leaves a partial deployment.

use std::collections::BTreeMap;

use tracing::info;
use url::Url;

use crate::app::commands::deploy::{DeployOptions, DeploymentResult, deploy};
use crate::domain::{
    AppError, DeploymentUnit, ServiceOverride, TranslateOptions, Variables, resolve, translate,
};
use crate::ports::{Controller, TemplateSource, VariablePrompter};

const APP_NAME_TOKEN: &str = "$$cap_appname";
const ROOT_DOMAIN_TOKEN: &str = "$$cap_root_domain";

/// What to deploy and under which name.
#[derive(Debug, Clone, Default)]
pub struct OneClickRequest {
    pub bundle: String,
    pub namespace: String,
    pub variables: Variables,
    pub app_names: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, ServiceOverride>,
    pub repository: Option<Url>,
    pub root_domain: Option<String>,
    /// Never prompt; unresolved variables are an error.
    pub automated: bool,
}

/// Resolved bundle ready for deployment.
#[derive(Debug, Clone)]
pub struct OneClickPlan {
    pub display_name: Option<String>,
    pub units: Vec<DeploymentUnit>,
    pub end_instructions: Option<String>,
}

#[derive(Debug)]
pub struct OneClickOutcome {
    pub display_name: Option<String>,
    pub results: Vec<DeploymentResult>,
    pub end_instructions: Option<String>,
}

impl OneClickOutcome {
    pub fn all_deployed(&self) -> bool {
        self.results.iter().all(DeploymentResult::is_deployed)
    }
}

/// Fetch and resolve the bundle, then translate it into deployment units.
pub fn plan<T: TemplateSource + ?Sized>(
    templates: &T,
    request: &OneClickRequest,
    prompter: Option<&dyn VariablePrompter>,
) -> Result<OneClickPlan, AppError> {
    let raw = templates.fetch_template(&request.bundle, request.repository.as_ref())?;

    let mut variables = request.variables.clone();
    variables.insert_default(APP_NAME_TOKEN, request.namespace.clone());
    if let Some(root_domain) = &request.root_domain {
        variables.insert_default(ROOT_DOMAIN_TOKEN, root_domain.clone());
    }

    let prompter = if request.automated { None } else { prompter };
    let document = resolve(&raw, &variables, prompter)?;

    let options = TranslateOptions {
        namespace: request.namespace.clone(),
        app_names: request.app_names.clone(),
        overrides: request.overrides.clone(),
    };
    let units = translate(&document, &options)?;
    info!(bundle = %request.bundle, units = units.len(), "bundle resolved");

    Ok(OneClickPlan {
        display_name: document.display_name(),
        units,
        end_instructions: document.end_instructions(),
    })
}

/// Run the full pipeline against `controller`.
pub fn deploy_bundle<C: Controller, T: TemplateSource + ?Sized>(
    controller: &C,
    templates: &T,
    request: &OneClickRequest,
    prompter: Option<&dyn VariablePrompter>,
    options: &DeployOptions,
) -> Result<OneClickOutcome, AppError> {
    let plan = plan(templates, request, prompter)?;
    let results = deploy(controller, &plan.units, options)?;
    Ok(OneClickOutcome {
        display_name: plan.display_name,
        results,
        end_instructions: plan.end_instructions,
    })
}
