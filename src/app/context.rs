use crate::ports::{Controller, TemplateSource};

/// Application context holding dependencies for command execution.
pub struct AppContext<C: Controller, T: TemplateSource> {
    controller: C,
    templates: T,
}

impl<C: Controller, T: TemplateSource> AppContext<C, T> {
    pub fn new(controller: C, templates: T) -> Self {
        Self { controller, templates }
    }

    /// Get a reference to the app registry.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Get a reference to the bundle source.
    pub fn templates(&self) -> &T {
        &self.templates
    }
}
