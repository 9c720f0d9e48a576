use clap::Args;

use crate::adapters::DialoguerGate;
use crate::app::api::{self, ActionResult, BulkAction, MatchMode};
use crate::domain::{AppError, Config};
use crate::ports::{AutoConfirm, ConfirmationGate};

#[derive(Args)]
pub struct PatternArgs {
    /// Regular expression matched against app names
    pattern: String,
    /// Require the pattern to match the whole name
    #[arg(long)]
    full_match: bool,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args)]
pub struct ScaleArgs {
    #[command(flatten)]
    target: PatternArgs,
    /// Instance count
    instances: u32,
}

#[derive(Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    target: PatternArgs,
    /// Also delete the apps' named volumes
    #[arg(long)]
    volumes: bool,
}

pub fn run_scale(config: &Config, args: ScaleArgs) -> Result<i32, AppError> {
    apply(config, &args.target, BulkAction::Scale(args.instances))
}

pub fn run_stop(config: &Config, args: PatternArgs) -> Result<i32, AppError> {
    apply(config, &args, BulkAction::Stop)
}

pub fn run_delete(config: &Config, args: DeleteArgs) -> Result<i32, AppError> {
    apply(config, &args.target, BulkAction::Delete { delete_volumes: args.volumes })
}

fn apply(config: &Config, target: &PatternArgs, action: BulkAction) -> Result<i32, AppError> {
    let mode = if target.full_match { MatchMode::Full } else { MatchMode::Substring };
    let gate: &dyn ConfirmationGate = if target.yes { &AutoConfirm } else { &DialoguerGate };
    let results = api::apply_to_matching(config, &target.pattern, &action, mode, gate)?;

    if results.is_empty() {
        println!("No apps match '{}'.", target.pattern);
        return Ok(0);
    }
    print_results(&action, &results);
    Ok(if results.iter().all(ActionResult::succeeded) { 0 } else { 1 })
}

fn print_results(action: &BulkAction, results: &[ActionResult]) {
    for result in results {
        match &result.error {
            None => println!("✅ {}: {}", action, result.app_name),
            Some(err) => println!("⚠️  {}: {} failed: {}", action, result.app_name, err),
        }
    }
}
