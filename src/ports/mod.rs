mod confirmation_gate;
mod controller;
mod template_source;
mod variable_prompter;

pub use confirmation_gate::{AutoConfirm, ConfirmationGate};
pub use controller::Controller;
pub use template_source::TemplateSource;
pub use variable_prompter::VariablePrompter;
