//! Controller-side app configuration and the partial updates applied to it.

use std::fmt;

use crate::domain::AppError;

/// Port the controller routes web traffic to when none is configured.
pub const DEFAULT_CONTAINER_HTTP_PORT: u16 = 80;

/// Current remote configuration of a named app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub name: String,
    pub has_persistent_data: bool,
    pub instance_count: u32,
    pub expose_as_web_app: bool,
    pub force_ssl: bool,
    pub websocket_support: bool,
    pub container_http_port: u16,
    pub description: String,
    pub command: Option<Vec<String>>,
    pub env_vars: Vec<EnvVar>,
    pub volumes: Vec<Volume>,
    pub ports: Vec<PortMapping>,
    pub http_auth: Option<HttpAuth>,
    /// Read-only: domains attached through `add_domain`.
    pub custom_domains: Vec<String>,
    /// Read-only: last image version the controller built, if any.
    pub deployed_version: Option<u32>,
}

impl AppState {
    /// State of an app the controller has just registered.
    pub fn new(name: impl Into<String>, has_persistent_data: bool) -> Self {
        Self {
            name: name.into(),
            has_persistent_data,
            instance_count: 1,
            expose_as_web_app: true,
            force_ssl: false,
            websocket_support: false,
            container_http_port: DEFAULT_CONTAINER_HTTP_PORT,
            description: String::new(),
            command: None,
            env_vars: Vec::new(),
            volumes: Vec::new(),
            ports: Vec::new(),
            http_auth: None,
            custom_domains: Vec::new(),
            deployed_version: None,
        }
    }

    /// An app counts as running once an image is deployed and it has instances.
    pub fn is_running(&self) -> bool {
        self.deployed_version.is_some() && self.instance_count > 0
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env_vars.iter().find(|var| var.key == key).map(|var| var.value.as_str())
    }

    /// Named volumes, the only ones the controller can delete alongside the app.
    pub fn volume_names(&self) -> Vec<String> {
        self.volumes
            .iter()
            .filter_map(|volume| match &volume.source {
                VolumeSource::Named(name) => Some(name.clone()),
                VolumeSource::HostPath(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Parse `KEY=VALUE`. The value may be empty or contain further `=`.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let (key, value) = spec.split_once('=').ok_or_else(|| {
            AppError::validation(format!("Environment variable '{}' must be KEY=VALUE", spec))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::validation(format!(
                "Environment variable '{}' has an empty key",
                spec
            )));
        }
        Ok(Self::new(key, value))
    }
}

/// Where a volume's data lives on the controller host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    Named(String),
    HostPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub container_path: String,
    pub source: VolumeSource,
}

impl Volume {
    pub fn named(name: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self { container_path: container_path.into(), source: VolumeSource::Named(name.into()) }
    }

    pub fn host_path(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            container_path: container_path.into(),
            source: VolumeSource::HostPath(host_path.into()),
        }
    }

    /// Parse `name:/container/path` or `/host/path:/container/path`.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let malformed = || {
            AppError::validation(format!(
                "Volume '{}' must be <name>:<container-path> or <host-path>:<container-path>",
                spec
            ))
        };

        let (source, container_path) = spec.trim().split_once(':').ok_or_else(malformed)?;
        if source.is_empty() || !container_path.starts_with('/') || container_path.contains(':')
        {
            return Err(malformed());
        }

        if source.starts_with('/') {
            return Ok(Self::host_path(source, container_path));
        }

        if !source.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(AppError::validation(format!(
                "Volume name '{}' may only contain letters, digits, '-', '_' or '.'",
                source
            )));
        }
        Ok(Self::named(source, container_path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

impl PortMapping {
    /// Parse `host:container`, or a single port used on both sides.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let parse_port = |raw: &str| {
            raw.trim().parse::<u16>().ok().filter(|port| *port > 0).ok_or_else(|| {
                AppError::validation(format!("Port mapping '{}' has an invalid port", spec))
            })
        };

        match spec.split_once(':') {
            Some((host, container)) => {
                Ok(Self { host_port: parse_port(host)?, container_port: parse_port(container)? })
            }
            None => {
                let port = parse_port(spec)?;
                Ok(Self { host_port: port, container_port: port })
            }
        }
    }
}

/// HTTP basic-auth credentials guarding an exposed app.
///
/// The controller only ever reports a stored credential as a hash, so state read
/// back from it carries [`AuthSecret::Hashed`] while new credentials are plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpAuth {
    pub user: String,
    pub secret: AuthSecret,
}

#[derive(Clone, PartialEq, Eq)]
pub enum AuthSecret {
    Password(String),
    Hashed(String),
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = match self.secret {
            AuthSecret::Password(_) => "password",
            AuthSecret::Hashed(_) => "hashed",
        };
        f.debug_struct("HttpAuth")
            .field("user", &self.user)
            .field(secret, &"[REDACTED]")
            .finish()
    }
}

impl HttpAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), secret: AuthSecret::Password(password.into()) }
    }

    pub fn hashed(user: impl Into<String>, hash: impl Into<String>) -> Self {
        Self { user: user.into(), secret: AuthSecret::Hashed(hash.into()) }
    }

    /// Parse `user:password`.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        match spec.split_once(':') {
            Some((user, password)) if !user.is_empty() && !password.is_empty() => {
                Ok(Self::new(user, password))
            }
            _ => Err(AppError::validation("HTTP auth must be user:password")),
        }
    }
}

/// What the controller should build an app from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Image(String),
    DockerfileLines(Vec<String>),
}

/// Partial update request. Absent scalars and empty collections leave state untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppUpdate {
    pub instance_count: Option<u32>,
    pub expose_as_web_app: Option<bool>,
    pub force_ssl: Option<bool>,
    pub websocket_support: Option<bool>,
    pub container_http_port: Option<u16>,
    pub description: Option<String>,
    pub command: Option<Vec<String>>,
    pub env_vars: Vec<EnvVar>,
    pub volumes: Vec<Volume>,
    pub ports: Vec<PortMapping>,
    pub http_auth: Option<HttpAuth>,
}

impl AppUpdate {
    pub fn is_empty(&self) -> bool {
        *self == AppUpdate::default()
    }

    pub fn scale(instance_count: u32) -> Self {
        Self { instance_count: Some(instance_count), ..Self::default() }
    }

    pub fn stop() -> Self {
        Self::scale(0)
    }
}

/// Explicit deletions; the merge engine never removes entries on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppRemoval {
    pub env_keys: Vec<String>,
    pub container_paths: Vec<String>,
    pub host_ports: Vec<u16>,
    pub http_auth: bool,
}

impl AppRemoval {
    pub fn is_empty(&self) -> bool {
        *self == AppRemoval::default()
    }
}
