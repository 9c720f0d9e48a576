//! CapRover controller client implementation using reqwest.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::domain::{
    AppError, AppState, AuthSecret, ControllerConfig, EnvVar, HttpAuth, ImageSource, PortMapping,
    RejectionKind, Volume, VolumeSource,
};
use crate::ports::Controller;

const LOGIN_PATH: &str = "/api/v2/login";
const APP_DEFINITIONS_PATH: &str = "/api/v2/user/apps/appDefinitions";
const REGISTER_PATH: &str = "/api/v2/user/apps/appDefinitions/register";
const UPDATE_PATH: &str = "/api/v2/user/apps/appDefinitions/update";
const DELETE_PATH: &str = "/api/v2/user/apps/appDefinitions/delete";
const CUSTOM_DOMAIN_PATH: &str = "/api/v2/user/apps/appDefinitions/customdomain";
const ENABLE_SSL_PATH: &str = "/api/v2/user/apps/appDefinitions/enablecustomdomainssl";
const APP_DATA_PATH: &str = "/api/v2/user/apps/appData";

const AUTH_HEADER: &str = "x-captain-auth";
const NAMESPACE_HEADER: &str = "x-namespace";

const STATUS_OK: u32 = 100;
const STATUS_ALREADY_EXISTS: u32 = 1103;
const STATUS_BAD_NAME: u32 = 1104;
const STATUS_AUTH_TOKEN_INVALID: u32 = 1106;
const STATUS_VERIFICATION_FAILED: u32 = 1107;
const STATUS_ILLEGAL_PARAMETER: u32 = 1110;
const STATUS_NOT_FOUND: u32 = 1111;

/// HTTP transport for the controller API.
///
/// Each call performs a single request; retries live in `RetryingController`.
/// The session token is obtained on first use and reused for the client's lifetime.
pub struct HttpController {
    base_url: Url,
    password: String,
    namespace: String,
    client: Client,
    token: Mutex<Option<String>>,
}

impl std::fmt::Debug for HttpController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpController")
            .field("base_url", &self.base_url)
            .field("namespace", &self.namespace)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl HttpController {
    pub fn new(config: &ControllerConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::config_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url()?,
            password: config.password()?.to_string(),
            namespace: config.namespace.clone(),
            client,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined)
            .map_err(|e| AppError::config_error(format!("Invalid request url '{}': {}", joined, e)))
    }

    fn token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().map_err(|_| lock_poisoned())?;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        debug!(url = %self.base_url, "logging in to controller");
        let envelope =
            self.exchange(Method::POST, LOGIN_PATH, &[], Some(&json!({ "password": self.password })), None)?;
        let data = envelope.into_data()?;
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::rejection(RejectionKind::Other, "Login response carried no token"))?
            .to_string();
        *cached = Some(token.clone());
        Ok(token)
    }

    fn forget_token(&self) {
        if let Ok(mut cached) = self.token.lock() {
            *cached = None;
        }
    }

    /// Authenticated call; a stale session is renewed once.
    fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        let token = self.token()?;
        let mut envelope = self.exchange(method.clone(), path, query, body, Some(&token))?;
        if envelope.status == STATUS_AUTH_TOKEN_INVALID {
            debug!("controller session expired, logging in again");
            self.forget_token();
            let token = self.token()?;
            envelope = self.exchange(method, path, query, body, Some(&token))?;
        }
        envelope.into_data()
    }

    fn exchange(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Envelope, AppError> {
        let mut request = self
            .client
            .request(method, self.url(path)?)
            .header(NAMESPACE_HEADER, &self.namespace)
            .query(query);
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(|e| AppError::RemoteTransient {
            message: format!("HTTP request failed: {}", e),
            status: None,
        })?;
        read_envelope(response)
    }
}

fn read_envelope(response: Response) -> Result<Envelope, AppError> {
    let status = response.status();
    let retry_after_ms = response.headers().get(RETRY_AFTER).and_then(parse_retry_after_ms);
    let body_text = response.text().unwrap_or_default();

    if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
        let mut message = if body_text.trim().is_empty() {
            format!("Controller responded with HTTP {}", status.as_u16())
        } else {
            body_text
        };
        if let Some(value) = retry_after_ms {
            message.push_str(&format!(" (retry_after_ms={})", value));
        }
        return Err(AppError::RemoteTransient { message, status: Some(status.as_u16()) });
    }

    if !status.is_success() {
        let kind = if status.as_u16() == 404 { RejectionKind::NotFound } else { RejectionKind::Other };
        return Err(AppError::rejection(
            kind,
            format!("Controller responded with HTTP {}: {}", status.as_u16(), body_text.trim()),
        ));
    }

    serde_json::from_str(&body_text).map_err(|e| {
        AppError::rejection(RejectionKind::Other, format!("Unexpected controller response: {}", e))
    })
}

fn parse_retry_after_ms(value: &HeaderValue) -> Option<u64> {
    let seconds = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(seconds.saturating_mul(1000))
}

fn lock_poisoned() -> AppError {
    AppError::config_error("Controller session lock poisoned")
}

/// `{status, description, data}` wrapper around every controller response.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn into_data(self) -> Result<Value, AppError> {
        if self.status == STATUS_OK {
            return Ok(self.data);
        }
        Err(AppError::rejection(classify(self.status, &self.description), self.description))
    }
}

fn classify(status: u32, description: &str) -> RejectionKind {
    match status {
        STATUS_ALREADY_EXISTS => return RejectionKind::AlreadyExists,
        STATUS_NOT_FOUND => return RejectionKind::NotFound,
        STATUS_VERIFICATION_FAILED => return RejectionKind::DomainNotVerified,
        STATUS_BAD_NAME | STATUS_ILLEGAL_PARAMETER => return RejectionKind::Validation,
        _ => {}
    }

    let lower = description.to_ascii_lowercase();
    if lower.contains("already exist") {
        RejectionKind::AlreadyExists
    } else if lower.contains("not found") || lower.contains("does not exist") {
        RejectionKind::NotFound
    } else if lower.contains("verify") || lower.contains("verification") {
        RejectionKind::DomainNotVerified
    } else {
        RejectionKind::Other
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppDefinitionsData {
    #[serde(default)]
    app_definitions: Vec<AppDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppDefinition {
    app_name: String,
    #[serde(default)]
    has_persistent_data: bool,
    #[serde(default)]
    instance_count: Option<u32>,
    #[serde(default)]
    not_expose_as_web_app: bool,
    #[serde(default)]
    force_ssl: bool,
    #[serde(default)]
    websocket_support: bool,
    #[serde(default)]
    container_http_port: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    env_vars: Vec<EnvVarDto>,
    #[serde(default)]
    volumes: Vec<VolumeDto>,
    #[serde(default)]
    ports: Vec<PortDto>,
    #[serde(default)]
    custom_domain: Vec<CustomDomainDto>,
    #[serde(default)]
    deployed_version: Option<u32>,
    #[serde(default)]
    versions: Vec<Value>,
    #[serde(default)]
    http_auth: Option<HttpAuthDto>,
    #[serde(default)]
    service_update_override: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvVarDto {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeDto {
    container_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortDto {
    container_port: u16,
    host_port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomDomainDto {
    public_domain: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpAuthDto {
    user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hashed: Option<String>,
}

impl HttpAuthDto {
    fn into_auth(self) -> Option<HttpAuth> {
        match (self.password, self.password_hashed) {
            (Some(password), _) => Some(HttpAuth::new(self.user, password)),
            (None, Some(hash)) => Some(HttpAuth::hashed(self.user, hash)),
            (None, None) => None,
        }
    }
}

impl From<&HttpAuth> for HttpAuthDto {
    fn from(auth: &HttpAuth) -> Self {
        let (password, password_hashed) = match &auth.secret {
            AuthSecret::Password(password) => (Some(password.clone()), None),
            AuthSecret::Hashed(hash) => (None, Some(hash.clone())),
        };
        Self { user: auth.user.clone(), password, password_hashed }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    app_name: String,
    instance_count: u32,
    not_expose_as_web_app: bool,
    force_ssl: bool,
    websocket_support: bool,
    container_http_port: u16,
    description: String,
    env_vars: Vec<EnvVarDto>,
    volumes: Vec<VolumeDto>,
    ports: Vec<PortDto>,
    http_auth: Option<HttpAuthDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_update_override: Option<String>,
}

impl From<AppDefinition> for AppState {
    fn from(definition: AppDefinition) -> Self {
        let mut state = AppState::new(definition.app_name, definition.has_persistent_data);
        state.instance_count = definition.instance_count.unwrap_or(state.instance_count);
        state.expose_as_web_app = !definition.not_expose_as_web_app;
        state.force_ssl = definition.force_ssl;
        state.websocket_support = definition.websocket_support;
        state.container_http_port =
            definition.container_http_port.unwrap_or(state.container_http_port);
        state.description = definition.description.unwrap_or_default();
        state.command = definition.service_update_override.as_deref().and_then(command_from_override);
        state.env_vars =
            definition.env_vars.into_iter().map(|var| EnvVar::new(var.key, var.value)).collect();
        state.volumes = definition
            .volumes
            .into_iter()
            .filter_map(|volume| match (volume.host_path, volume.volume_name) {
                (Some(host_path), _) => Some(Volume::host_path(host_path, volume.container_path)),
                (None, Some(name)) => Some(Volume::named(name, volume.container_path)),
                (None, None) => None,
            })
            .collect();
        state.ports = definition
            .ports
            .into_iter()
            .map(|port| PortMapping { host_port: port.host_port, container_port: port.container_port })
            .collect();
        state.http_auth = definition.http_auth.and_then(HttpAuthDto::into_auth);
        state.custom_domains =
            definition.custom_domain.into_iter().map(|domain| domain.public_domain).collect();
        state.deployed_version =
            if definition.versions.is_empty() { None } else { definition.deployed_version };
        state
    }
}

impl From<&AppState> for UpdateRequest {
    fn from(state: &AppState) -> Self {
        Self {
            app_name: state.name.clone(),
            instance_count: state.instance_count,
            not_expose_as_web_app: !state.expose_as_web_app,
            force_ssl: state.force_ssl,
            websocket_support: state.websocket_support,
            container_http_port: state.container_http_port,
            description: state.description.clone(),
            env_vars: state
                .env_vars
                .iter()
                .map(|var| EnvVarDto { key: var.key.clone(), value: var.value.clone() })
                .collect(),
            volumes: state
                .volumes
                .iter()
                .map(|volume| match &volume.source {
                    VolumeSource::Named(name) => VolumeDto {
                        container_path: volume.container_path.clone(),
                        volume_name: Some(name.clone()),
                        host_path: None,
                    },
                    VolumeSource::HostPath(path) => VolumeDto {
                        container_path: volume.container_path.clone(),
                        volume_name: None,
                        host_path: Some(path.clone()),
                    },
                })
                .collect(),
            ports: state
                .ports
                .iter()
                .map(|port| PortDto { container_port: port.container_port, host_port: port.host_port })
                .collect(),
            http_auth: state.http_auth.as_ref().map(HttpAuthDto::from),
            service_update_override: state.command.as_deref().map(command_override),
        }
    }
}

/// Docker service override carrying a command, as the controller expects it.
fn command_override(command: &[String]) -> String {
    json!({ "TaskTemplate": { "ContainerSpec": { "Command": command } } }).to_string()
}

fn command_from_override(raw: &str) -> Option<Vec<String>> {
    let parsed: Value = serde_json::from_str(raw).ok()?;
    let command = parsed.pointer("/TaskTemplate/ContainerSpec/Command")?.as_array()?;
    command.iter().map(|arg| arg.as_str().map(str::to_string)).collect()
}

fn captain_definition(source: &ImageSource) -> String {
    match source {
        ImageSource::Image(image) => json!({ "schemaVersion": 2, "imageName": image }),
        ImageSource::DockerfileLines(lines) => json!({ "schemaVersion": 2, "dockerfileLines": lines }),
    }
    .to_string()
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::validation(format!("Failed to encode request: {}", e)))
}

impl Controller for HttpController {
    fn list_apps(&self) -> Result<Vec<AppState>, AppError> {
        let data = self.call(Method::GET, APP_DEFINITIONS_PATH, &[], None)?;
        let definitions: AppDefinitionsData = serde_json::from_value(data).map_err(|e| {
            AppError::rejection(RejectionKind::Other, format!("Unexpected app list: {}", e))
        })?;
        Ok(definitions.app_definitions.into_iter().map(AppState::from).collect())
    }

    fn create_app(&self, name: &str, has_persistent_data: bool) -> Result<(), AppError> {
        let body = json!({ "appName": name, "hasPersistentData": has_persistent_data });
        self.call(Method::POST, REGISTER_PATH, &[("detached", "1")], Some(&body))?;
        Ok(())
    }

    fn update_app(&self, state: &AppState) -> Result<(), AppError> {
        let body = to_json(&UpdateRequest::from(state))?;
        self.call(Method::POST, UPDATE_PATH, &[], Some(&body))?;
        Ok(())
    }

    fn delete_app(&self, name: &str, volumes: &[String]) -> Result<(), AppError> {
        let body = json!({ "appName": name, "volumes": volumes });
        self.call(Method::POST, DELETE_PATH, &[], Some(&body))?;
        Ok(())
    }

    fn add_domain(&self, name: &str, domain: &str) -> Result<(), AppError> {
        let body = json!({ "appName": name, "customDomain": domain });
        self.call(Method::POST, CUSTOM_DOMAIN_PATH, &[], Some(&body))?;
        Ok(())
    }

    fn enable_ssl(&self, name: &str, domain: &str) -> Result<(), AppError> {
        let body = json!({ "appName": name, "customDomain": domain });
        self.call(Method::POST, ENABLE_SSL_PATH, &[], Some(&body))?;
        Ok(())
    }

    fn deploy_image(&self, name: &str, source: &ImageSource) -> Result<(), AppError> {
        let body = json!({ "captainDefinitionContent": captain_definition(source), "gitHash": "" });
        let path = format!("{}/{}", APP_DATA_PATH, name);
        self.call(Method::POST, &path, &[("detached", "1")], Some(&body))?;
        Ok(())
    }
}
