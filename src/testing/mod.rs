//! In-memory fakes for the ports, shared by unit tests.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::adapters::MemoryController;
use crate::domain::{AppError, AppState, HexSource, ImageSource, RejectionKind};
use crate::ports::{ConfirmationGate, Controller, TemplateSource, VariablePrompter};

/// Hands out queued hex strings, then a deterministic fallback.
#[derive(Debug, Default)]
pub struct SequenceHex {
    queued: VecDeque<String>,
    issued: usize,
}

impl SequenceHex {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { queued: values.into_iter().map(Into::into).collect(), issued: 0 }
    }
}

impl HexSource for SequenceHex {
    fn hex(&mut self, len: usize) -> String {
        self.issued += 1;
        self.queued.pop_front().unwrap_or_else(|| {
            let digit = std::char::from_digit((self.issued % 16) as u32, 16).unwrap_or('0');
            std::iter::repeat_n(digit, len).collect()
        })
    }
}

/// Answers prompts from a fixed table and records what was asked.
#[derive(Clone, Default)]
pub struct CannedPrompter {
    answers: BTreeMap<String, String>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl CannedPrompter {
    pub fn new<I, K, V>(answers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl VariablePrompter for CannedPrompter {
    fn prompt(&self, token: &str) -> Result<String, AppError> {
        self.asked.lock().unwrap().push(token.to_string());
        Ok(self.answers.get(token).cloned().unwrap_or_default())
    }
}

/// Confirmation gate with a fixed answer.
#[derive(Clone)]
pub struct ScriptedGate {
    answer: bool,
    pub shown: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedGate {
    pub fn new(answer: bool) -> Self {
        Self { answer, shown: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn times_shown(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

impl ConfirmationGate for ScriptedGate {
    fn confirm(&self, _action: &str, matches: &[String]) -> Result<bool, AppError> {
        self.shown.lock().unwrap().push(matches.to_vec());
        Ok(self.answer)
    }
}

/// Serves templates from a map keyed by bundle name.
#[derive(Clone, Default)]
pub struct StaticTemplates {
    templates: BTreeMap<String, String>,
}

impl StaticTemplates {
    pub fn new<I: IntoIterator<Item = (&'static str, &'static str)>>(templates: I) -> Self {
        Self {
            templates: templates.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

impl TemplateSource for StaticTemplates {
    fn fetch_template(
        &self,
        bundle: &str,
        _repository: Option<&url::Url>,
    ) -> Result<String, AppError> {
        self.templates
            .get(bundle)
            .cloned()
            .ok_or_else(|| AppError::rejection(RejectionKind::NotFound, format!("No bundle '{}'", bundle)))
    }
}

/// Registry fake that records every call as `op:app` and can inject failures.
#[derive(Clone, Default)]
pub struct RecordingController {
    registry: Arc<MemoryController>,
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashSet<String>>>,
    transient: Arc<Mutex<HashSet<String>>>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apps<I: IntoIterator<Item = &'static str>>(names: I) -> Self {
        let apps = names.into_iter().map(|name| AppState::new(name, false)).collect();
        Self { registry: Arc::new(MemoryController::seeded(apps)), ..Self::default() }
    }

    pub fn with_states(apps: Vec<AppState>) -> Self {
        Self { registry: Arc::new(MemoryController::seeded(apps)), ..Self::default() }
    }

    /// Make `op` on `app` fail with a rejection, e.g. `fail("update", "web-shop")`.
    pub fn fail(&self, op: &str, app: &str) {
        self.failures.lock().unwrap().insert(format!("{}:{}", op, app));
    }

    /// Make `op` on `app` fail with a transient error.
    pub fn fail_transiently(&self, op: &str, app: &str) {
        self.transient.lock().unwrap().insert(format!("{}:{}", op, app));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls excluding reads.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("list:") && !call.starts_with("get:"))
            .collect()
    }

    pub fn app(&self, name: &str) -> Option<AppState> {
        self.registry.get_app(name).ok()
    }

    fn record(&self, op: &str, app: &str) -> Result<(), AppError> {
        let call = format!("{}:{}", op, app);
        self.calls.lock().unwrap().push(call.clone());
        if self.transient.lock().unwrap().contains(&call) {
            return Err(AppError::RemoteTransient {
                message: format!("{} timed out", call),
                status: None,
            });
        }
        if self.failures.lock().unwrap().contains(&call) {
            return Err(AppError::rejection(RejectionKind::Other, format!("{} refused", call)));
        }
        Ok(())
    }
}

impl Controller for RecordingController {
    fn list_apps(&self) -> Result<Vec<AppState>, AppError> {
        self.record("list", "*")?;
        self.registry.list_apps()
    }

    fn get_app(&self, name: &str) -> Result<AppState, AppError> {
        self.record("get", name)?;
        self.registry.get_app(name)
    }

    fn create_app(&self, name: &str, has_persistent_data: bool) -> Result<(), AppError> {
        self.record("create", name)?;
        self.registry.create_app(name, has_persistent_data)
    }

    fn update_app(&self, state: &AppState) -> Result<(), AppError> {
        self.record("update", &state.name)?;
        self.registry.update_app(state)
    }

    fn delete_app(&self, name: &str, volumes: &[String]) -> Result<(), AppError> {
        self.record(if volumes.is_empty() { "delete" } else { "delete+volumes" }, name)?;
        self.registry.delete_app(name, volumes)
    }

    fn add_domain(&self, name: &str, domain: &str) -> Result<(), AppError> {
        self.record("domain", name)?;
        self.registry.add_domain(name, domain)
    }

    fn enable_ssl(&self, name: &str, domain: &str) -> Result<(), AppError> {
        self.record("ssl", name)?;
        self.registry.enable_ssl(name, domain)
    }

    fn deploy_image(&self, name: &str, source: &ImageSource) -> Result<(), AppError> {
        self.record("deploy", name)?;
        self.registry.deploy_image(name, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_controller_tracks_lifecycle() {
        let controller = RecordingController::new();
        controller.create_app("web", false).unwrap();
        assert!(controller.create_app("web", false).unwrap_err().is_rejection(RejectionKind::AlreadyExists));

        controller.deploy_image("web", &ImageSource::Image("nginx".into())).unwrap();
        assert!(controller.get_app("web").unwrap().is_running());
        assert_eq!(controller.mutations(), vec!["create:web", "create:web", "deploy:web"]);
    }
}
