//! In-memory controller registry used for dry runs.

use std::sync::{Mutex, MutexGuard};

use crate::domain::{AppError, AppState, ImageSource, RejectionKind};
use crate::ports::Controller;

/// Registry kept in process memory.
///
/// Seeded from a live listing, it lets the whole deployment pipeline run without
/// touching the remote controller; every mutation is journaled for display.
#[derive(Debug, Default)]
pub struct MemoryController {
    apps: Mutex<Vec<AppState>>,
    journal: Mutex<Vec<String>>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(apps: Vec<AppState>) -> Self {
        Self { apps: Mutex::new(apps), journal: Mutex::new(Vec::new()) }
    }

    /// Human-readable log of the mutations performed so far.
    pub fn journal(&self) -> Vec<String> {
        lock(&self.journal).map(|journal| journal.clone()).unwrap_or_default()
    }

    fn note(&self, entry: String) -> Result<(), AppError> {
        lock(&self.journal)?.push(entry);
        Ok(())
    }

    fn with_app<T>(
        &self,
        name: &str,
        apply: impl FnOnce(&mut AppState) -> T,
    ) -> Result<T, AppError> {
        let mut apps = lock(&self.apps)?;
        let app =
            apps.iter_mut().find(|app| app.name == name).ok_or_else(|| AppError::not_found(name))?;
        Ok(apply(app))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex.lock().map_err(|_| AppError::config_error("In-memory registry lock poisoned"))
}

impl Controller for MemoryController {
    fn list_apps(&self) -> Result<Vec<AppState>, AppError> {
        Ok(lock(&self.apps)?.clone())
    }

    fn create_app(&self, name: &str, has_persistent_data: bool) -> Result<(), AppError> {
        {
            let mut apps = lock(&self.apps)?;
            if apps.iter().any(|app| app.name == name) {
                return Err(AppError::rejection(
                    RejectionKind::AlreadyExists,
                    format!("App '{}' already exists", name),
                ));
            }
            apps.push(AppState::new(name, has_persistent_data));
        }
        let suffix = if has_persistent_data { " (persistent data)" } else { "" };
        self.note(format!("create {}{}", name, suffix))
    }

    fn update_app(&self, state: &AppState) -> Result<(), AppError> {
        self.with_app(&state.name, |app| {
            let preserved = (app.has_persistent_data, app.deployed_version);
            let domains = std::mem::take(&mut app.custom_domains);
            *app = state.clone();
            (app.has_persistent_data, app.deployed_version) = preserved;
            app.custom_domains = domains;
        })?;
        self.note(format!(
            "update {}: instances={} env={} volumes={} ports={} exposed={}",
            state.name,
            state.instance_count,
            state.env_vars.len(),
            state.volumes.len(),
            state.ports.len(),
            state.expose_as_web_app
        ))
    }

    fn delete_app(&self, name: &str, volumes: &[String]) -> Result<(), AppError> {
        {
            let mut apps = lock(&self.apps)?;
            let before = apps.len();
            apps.retain(|app| app.name != name);
            if apps.len() == before {
                return Err(AppError::not_found(name));
            }
        }
        if volumes.is_empty() {
            self.note(format!("delete {}", name))
        } else {
            self.note(format!("delete {} with volumes {}", name, volumes.join(", ")))
        }
    }

    fn add_domain(&self, name: &str, domain: &str) -> Result<(), AppError> {
        self.with_app(name, |app| {
            if !app.custom_domains.iter().any(|existing| existing == domain) {
                app.custom_domains.push(domain.to_string());
            }
        })?;
        self.note(format!("attach {} to {}", domain, name))
    }

    fn enable_ssl(&self, name: &str, domain: &str) -> Result<(), AppError> {
        let attached = self.with_app(name, |app| app.custom_domains.iter().any(|d| d == domain))?;
        if !attached {
            return Err(AppError::rejection(
                RejectionKind::DomainNotVerified,
                format!("Domain '{}' is not attached to '{}'", domain, name),
            ));
        }
        self.note(format!("enable ssl for {} on {}", domain, name))
    }

    fn deploy_image(&self, name: &str, source: &ImageSource) -> Result<(), AppError> {
        self.with_app(name, |app| {
            app.deployed_version = Some(app.deployed_version.map_or(0, |version| version + 1));
        })?;
        let description = match source {
            ImageSource::Image(image) => image.clone(),
            ImageSource::DockerfileLines(lines) => format!("{} dockerfile lines", lines.len()),
        };
        self.note(format!("deploy {} from {}", name, description))
    }
}
