//! Deployment orchestration.
//!
//! Each unit walks `Pending → Creating → (Created | CreateFailed) → Updating →
//! (Deployed | UpdateFailed)`. Apps already present in the registry snapshot skip
//! the create step. Units never share state beyond that snapshot, so a failure is
//! recorded against its unit and the rest carry on.

use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::commands::pool::run_ordered;
use crate::domain::{AppError, AppState, DeploymentUnit, RejectionKind, merge};
use crate::ports::Controller;

/// Ceiling for the polling backoff, as a multiple of the base interval.
const MAX_POLL_BACKOFF_FACTOR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Creating,
    Created,
    CreateFailed,
    Updating,
    Deployed,
    UpdateFailed,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Deployed | UnitState::CreateFailed | UnitState::UpdateFailed)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnitState::Pending => "pending",
            UnitState::Creating => "creating",
            UnitState::Created => "created",
            UnitState::CreateFailed => "create failed",
            UnitState::Updating => "updating",
            UnitState::Deployed => "deployed",
            UnitState::UpdateFailed => "update failed",
        };
        f.write_str(label)
    }
}

/// Whether a deployed unit was observed running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningStatus {
    NotPolled,
    Confirmed,
    /// Configuration accepted, but the app was not seen running within the poll budget.
    Unconfirmed,
}

/// Outcome for one deployment unit.
#[derive(Debug)]
pub struct DeploymentResult {
    pub service_key: String,
    pub app_name: String,
    pub state: UnitState,
    /// Every state the unit passed through, in order.
    pub trail: Vec<UnitState>,
    pub running: RunningStatus,
    pub error: Option<AppError>,
}

impl DeploymentResult {
    fn pending(unit: &DeploymentUnit) -> Self {
        Self {
            service_key: unit.service_key.clone(),
            app_name: unit.app_name.clone(),
            state: UnitState::Pending,
            trail: vec![UnitState::Pending],
            running: RunningStatus::NotPolled,
            error: None,
        }
    }

    fn advance(&mut self, state: UnitState) {
        self.state = state;
        self.trail.push(state);
    }

    fn fail(mut self, state: UnitState, error: AppError) -> Self {
        warn!(app = %self.app_name, state = %state, error = %error, "deployment unit failed");
        self.advance(state);
        self.error = Some(error);
        self
    }

    pub fn is_deployed(&self) -> bool {
        self.state == UnitState::Deployed
    }
}

/// Running-state polling after a successful update.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn disabled() -> Self {
        Self { attempts: 0, interval: Duration::ZERO }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(3);
        self.interval * factor.min(MAX_POLL_BACKOFF_FACTOR)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeployOptions {
    pub max_parallel: usize,
    pub poll: PollPolicy,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self { max_parallel: 1, poll: PollPolicy::disabled() }
    }
}

/// Create or update every unit, returning one result per unit in input order.
///
/// Only the initial registry listing can fail the call as a whole; afterwards
/// every error is recorded on its unit.
pub fn deploy<C: Controller>(
    controller: &C,
    units: &[DeploymentUnit],
    options: &DeployOptions,
) -> Result<Vec<DeploymentResult>, AppError> {
    let snapshot: HashMap<String, AppState> =
        controller.list_apps()?.into_iter().map(|app| (app.name.clone(), app)).collect();
    debug!(units = units.len(), existing = snapshot.len(), "starting deployment");

    let results = run_ordered(units, options.max_parallel, |unit| {
        deploy_unit(controller, unit, snapshot.get(&unit.app_name), &options.poll)
    });

    let deployed = results.iter().filter(|result| result.is_deployed()).count();
    info!(deployed, failed = results.len() - deployed, "deployment finished");
    Ok(results)
}

fn deploy_unit<C: Controller>(
    controller: &C,
    unit: &DeploymentUnit,
    existing: Option<&AppState>,
    poll: &PollPolicy,
) -> DeploymentResult {
    let mut result = DeploymentResult::pending(unit);

    let current = match existing {
        Some(state) => {
            debug!(app = %unit.app_name, "app exists, skipping create");
            if gains_persistent_data(state, unit) {
                warn!(
                    app = %unit.app_name,
                    "existing app was created without persistent data; the controller may reject its volumes"
                );
            }
            state.clone()
        }
        None => {
            result.advance(UnitState::Creating);
            match create(controller, unit) {
                Ok(state) => {
                    result.advance(UnitState::Created);
                    state
                }
                Err(err) => return result.fail(UnitState::CreateFailed, err),
            }
        }
    };

    result.advance(UnitState::Updating);
    let desired = merge(&current, &unit.config);
    let applied = controller
        .update_app(&desired)
        .and_then(|_| controller.deploy_image(&unit.app_name, &unit.image));
    if let Err(err) = applied {
        return result.fail(UnitState::UpdateFailed, err);
    }

    result.advance(UnitState::Deployed);
    result.running = poll_running(controller, &unit.app_name, poll);
    info!(app = %unit.app_name, service = %unit.service_key, "deployed");
    result
}

/// Volumes declared for an app the controller registered as stateless.
fn gains_persistent_data(existing: &AppState, unit: &DeploymentUnit) -> bool {
    unit.has_persistent_data && !existing.has_persistent_data
}

/// Register the app. An app that appeared since the snapshot is adopted as-is.
fn create<C: Controller>(controller: &C, unit: &DeploymentUnit) -> Result<AppState, AppError> {
    match controller.create_app(&unit.app_name, unit.has_persistent_data) {
        Ok(()) => Ok(AppState::new(&unit.app_name, unit.has_persistent_data)),
        Err(err) if err.is_rejection(RejectionKind::AlreadyExists) => {
            warn!(app = %unit.app_name, "app appeared after the registry snapshot, updating it instead");
            controller.get_app(&unit.app_name)
        }
        Err(err) => Err(err),
    }
}

fn poll_running<C: Controller>(controller: &C, app_name: &str, poll: &PollPolicy) -> RunningStatus {
    if poll.attempts == 0 {
        return RunningStatus::NotPolled;
    }

    for attempt in 0..poll.attempts {
        thread::sleep(poll.delay(attempt));
        match controller.get_app(app_name) {
            Ok(state) if state.is_running() => return RunningStatus::Confirmed,
            Ok(_) => debug!(app = %app_name, attempt, "not running yet"),
            Err(err) => debug!(app = %app_name, attempt, error = %err, "poll failed"),
        }
    }
    RunningStatus::Unconfirmed
}
