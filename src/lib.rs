//! capdeploy: resolve one-click app bundles and deploy them to a CapRover controller.

pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;

pub use app::api;
pub use domain::AppError;
