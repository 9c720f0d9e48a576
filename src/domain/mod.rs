pub mod app_name;
pub mod app_state;
pub mod bundle;
pub mod config;
pub mod error;
pub mod merge;
pub mod resolver;
pub mod token;
pub mod translate;

pub use app_state::{
    AppRemoval, AppState, AppUpdate, AuthSecret, EnvVar, HttpAuth, ImageSource, PortMapping, Volume,
    VolumeSource,
};
pub use bundle::{BundleDocument, VariableDeclaration};
pub use config::{Config, ControllerConfig, DeployConfig};
pub use error::{AppError, RejectionKind};
pub use merge::{merge, overlay, prune};
pub use resolver::{HexSource, ResolutionPass, ThreadRngHex, Variables, resolve};
pub use translate::{DeploymentUnit, ServiceOverride, TranslateOptions, translate};
