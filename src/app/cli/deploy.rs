use std::fs;
use std::path::PathBuf;

use clap::Args;
use url::Url;

use crate::adapters::DialoguerPrompter;
use crate::app::api::{self, DeployReport, DeployTarget, OneClickRequest, RunningStatus};
use crate::domain::{AppError, Config, ServiceOverride, Variables};
use crate::ports::VariablePrompter;

#[derive(Args)]
pub struct DeployArgs {
    /// Bundle name in the template repository
    #[arg(required_unless_present = "file")]
    bundle: Option<String>,
    /// Deployment name; app names default to <service>-<name>
    #[arg(short, long)]
    name: String,
    /// Variable value as key=value (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
    /// Read the bundle from a local file
    #[arg(short, long, conflicts_with = "bundle")]
    file: Option<PathBuf>,
    /// Template repository to fetch the bundle from
    #[arg(long)]
    repository: Option<Url>,
    /// YAML file with per-service overrides
    #[arg(long)]
    overrides: Option<PathBuf>,
    /// Never prompt; fail on unresolved variables
    #[arg(short = 'y', long)]
    yes: bool,
    /// Show what would change without touching the controller's apps
    #[arg(long)]
    dry_run: bool,
}

impl DeployArgs {
    fn request(&self) -> Result<OneClickRequest, AppError> {
        let overrides = match &self.overrides {
            Some(path) => ServiceOverride::parse_map(&fs::read_to_string(path)?)?,
            None => Default::default(),
        };
        Ok(OneClickRequest {
            bundle: self.bundle.clone().unwrap_or_default(),
            namespace: self.name.clone(),
            variables: Variables::from_pairs(&self.vars)?,
            overrides,
            repository: self.repository.clone(),
            automated: self.yes,
            ..OneClickRequest::default()
        })
    }
}

/// Returns 1 when any unit failed.
pub fn run_deploy(config: Config, args: DeployArgs) -> Result<i32, AppError> {
    let request = args.request()?;
    let target = DeployTarget { template_file: args.file.clone(), dry_run: args.dry_run };
    let prompter = DialoguerPrompter;
    let prompter: Option<&dyn VariablePrompter> = if args.yes { None } else { Some(&prompter) };

    let report = api::deploy(config, request, &target, prompter)?;
    print_report(&report);
    Ok(if report.outcome.all_deployed() { 0 } else { 1 })
}

fn print_report(report: &DeployReport) {
    if let Some(planned) = &report.planned {
        println!("Dry run, planned changes:");
        for entry in planned {
            println!("  • {}", entry);
        }
    }

    for result in &report.outcome.results {
        match &result.error {
            None => {
                let note = match result.running {
                    RunningStatus::Unconfirmed => " (not yet confirmed running)",
                    _ => "",
                };
                println!("✅ {} ({}) {}{}", result.app_name, result.service_key, result.state, note);
            }
            Some(err) => {
                println!("⚠️  {} ({}) {}: {}", result.app_name, result.service_key, result.state, err);
            }
        }
    }

    if let (None, Some(instructions)) = (&report.planned, &report.outcome.end_instructions) {
        println!();
        println!("{}", instructions);
    }
}
