pub mod controller_http;
pub mod controller_retrying;
pub mod dialoguer_prompt;
pub mod memory_controller;
pub mod template_filesystem;
pub mod template_http;
pub mod template_retrying;

pub use controller_http::HttpController;
pub use controller_retrying::{RetryPolicy, RetryingController};
pub use dialoguer_prompt::{DialoguerGate, DialoguerPrompter};
pub use memory_controller::MemoryController;
pub use template_filesystem::FilesystemTemplateSource;
pub use template_http::HttpTemplateSource;
pub use template_retrying::RetryingTemplateSource;
