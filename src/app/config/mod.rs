//! Configuration loading from disk and the environment.
//!
//! Pure schema parsing and validation live in `domain::config`.

mod load_config;

pub use load_config::{apply_environment, load_config};
