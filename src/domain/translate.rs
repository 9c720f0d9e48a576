//! Service definition translation: resolved bundle → ordered deployment units.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::domain::app_name::{derive_app_name, validate_app_name};
use crate::domain::bundle::{BundleDocument, scalar_to_bool, scalar_to_string};
use crate::domain::merge::overlay;
use crate::domain::{AppError, AppUpdate, EnvVar, HttpAuth, ImageSource, PortMapping, Volume};

/// One entry of a bundle's service list, as declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub key: String,
    pub image: ImageSource,
    pub container_http_port: Option<u16>,
    pub volumes: Vec<Volume>,
    pub env_vars: Vec<EnvVar>,
    pub ports: Vec<PortMapping>,
    pub command: Option<Vec<String>>,
    pub http_auth: Option<HttpAuth>,
    pub expose_as_web_app: bool,
    pub websocket_support: Option<bool>,
    pub app_name: Option<String>,
}

impl ServiceDescriptor {
    pub fn from_yaml(key: &str, node: &Value) -> Result<Self, AppError> {
        if !node.is_mapping() {
            return Err(AppError::TemplateParse(format!("service '{}' must be a mapping", key)));
        }
        let extra = node.get("caproverExtra");
        let extra_field = |name: &str| extra.and_then(|extra| extra.get(name));

        let image = match extra_field("dockerfileLines") {
            Some(lines) => ImageSource::DockerfileLines(string_list(key, "dockerfileLines", lines)?),
            None => match node.get("image").and_then(scalar_to_string).filter(|s| !s.is_empty()) {
                Some(image) => ImageSource::Image(image),
                None => {
                    return Err(AppError::validation(format!(
                        "Service '{}' declares neither an image nor dockerfileLines",
                        key
                    )));
                }
            },
        };

        let container_http_port = extra_field("containerHttpPort")
            .map(|value| parse_port_field(key, value))
            .transpose()?;

        let expose_as_web_app = match extra_field("notExposeAsWebApp") {
            Some(value) => !bool_field(key, "notExposeAsWebApp", value)?,
            None => true,
        };

        let websocket_support = extra_field("websocketSupport")
            .map(|value| bool_field(key, "websocketSupport", value))
            .transpose()?;

        let http_auth = match extra_field("httpAuth") {
            Some(auth) => {
                let user = auth.get("user").and_then(scalar_to_string).unwrap_or_default();
                let password = auth.get("password").and_then(scalar_to_string).unwrap_or_default();
                (!user.is_empty() && !password.is_empty()).then(|| HttpAuth::new(user, password))
            }
            None => None,
        };

        let volumes = match node.get("volumes") {
            Some(list) => string_list(key, "volumes", list)?
                .iter()
                .map(|spec| Volume::parse(spec))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let ports = match node.get("ports") {
            Some(list) => string_list(key, "ports", list)?
                .iter()
                .map(|spec| PortMapping::parse(spec))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let env_vars = match node.get("environment") {
            Some(env) => parse_environment(key, env)?,
            None => Vec::new(),
        };

        let command = match node.get("command") {
            Some(list @ Value::Sequence(_)) => Some(string_list(key, "command", list)?),
            Some(value) => scalar_to_string(value)
                .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|args| !args.is_empty()),
            None => None,
        };

        let app_name = extra_field("appName").and_then(scalar_to_string).filter(|s| !s.is_empty());

        Ok(Self {
            key: key.to_string(),
            image,
            container_http_port,
            volumes,
            env_vars,
            ports,
            command,
            http_auth,
            expose_as_web_app,
            websocket_support,
            app_name,
        })
    }

    /// The configuration this service asks for, before caller overrides.
    pub fn desired_update(&self) -> AppUpdate {
        AppUpdate {
            expose_as_web_app: Some(self.expose_as_web_app),
            websocket_support: self.websocket_support,
            container_http_port: self.container_http_port,
            command: self.command.clone(),
            env_vars: self.env_vars.clone(),
            volumes: self.volumes.clone(),
            ports: self.ports.clone(),
            http_auth: self.http_auth.clone(),
            ..AppUpdate::default()
        }
    }
}

/// Caller-side adjustments for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOverride {
    pub app_name: Option<String>,
    pub image: Option<ImageSource>,
    pub update: AppUpdate,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ServiceOverrideSpec {
    app_name: Option<String>,
    image: Option<String>,
    #[serde(default)]
    environment: Mapping,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    ports: Vec<String>,
    command: Option<Vec<String>>,
    http_auth: Option<String>,
    expose_as_web_app: Option<bool>,
    container_http_port: Option<u16>,
    instance_count: Option<u32>,
}

impl ServiceOverride {
    /// Parse a `service key → override` document; unknown fields are rejected.
    pub fn parse_map(raw: &str) -> Result<BTreeMap<String, ServiceOverride>, AppError> {
        let specs: BTreeMap<String, ServiceOverrideSpec> = serde_yaml::from_str(raw)
            .map_err(|e| AppError::validation(format!("Invalid service overrides: {}", e)))?;

        specs
            .into_iter()
            .map(|(key, spec)| {
                let env_vars = parse_environment(&key, &Value::Mapping(spec.environment))?;
                let update = AppUpdate {
                    instance_count: spec.instance_count,
                    expose_as_web_app: spec.expose_as_web_app,
                    container_http_port: spec.container_http_port,
                    command: spec.command,
                    env_vars,
                    volumes: spec.volumes.iter().map(|v| Volume::parse(v)).collect::<Result<_, _>>()?,
                    ports: spec.ports.iter().map(|p| PortMapping::parse(p)).collect::<Result<_, _>>()?,
                    http_auth: spec.http_auth.as_deref().map(HttpAuth::parse).transpose()?,
                    ..AppUpdate::default()
                };
                let service_override = ServiceOverride {
                    app_name: spec.app_name,
                    image: spec.image.map(ImageSource::Image),
                    update,
                };
                Ok((key, service_override))
            })
            .collect()
    }
}

/// Inputs to [`translate`] besides the bundle itself.
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Deployment name used to derive `<service-key>-<namespace>` app names.
    pub namespace: String,
    /// Explicit app names by service key, used verbatim.
    pub app_names: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, ServiceOverride>,
}

/// Resolved, controller-addressable target for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentUnit {
    pub service_key: String,
    pub app_name: String,
    pub image: ImageSource,
    pub has_persistent_data: bool,
    pub config: AppUpdate,
}

/// Translate a resolved bundle into deployment units, in declaration order.
///
/// Fails before anything is deployed if an override targets an unknown service,
/// an explicit name is invalid, or two services land on the same app name.
pub fn translate(
    bundle: &BundleDocument,
    options: &TranslateOptions,
) -> Result<Vec<DeploymentUnit>, AppError> {
    let services = bundle.services()?;

    let unknown: Vec<&str> = options
        .overrides
        .keys()
        .chain(options.app_names.keys())
        .filter(|key| !services.iter().any(|(service_key, _)| service_key == *key))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(AppError::validation(format!(
            "Overrides reference unknown services: {}",
            unknown.join(", ")
        )));
    }

    let mut units = Vec::with_capacity(services.len());
    for (key, node) in &services {
        let descriptor = ServiceDescriptor::from_yaml(key, node)?;
        let service_override = options.overrides.get(key);

        let explicit = options
            .app_names
            .get(key)
            .cloned()
            .or_else(|| service_override.and_then(|o| o.app_name.clone()))
            .or_else(|| descriptor.app_name.clone());
        let app_name = match explicit {
            Some(name) => {
                validate_app_name(&name)?;
                name
            }
            None => derive_app_name(key, &options.namespace)?,
        };

        let mut config = descriptor.desired_update();
        let mut image = descriptor.image.clone();
        if let Some(service_override) = service_override {
            config = overlay(&config, &service_override.update);
            if let Some(replacement) = &service_override.image {
                image = replacement.clone();
            }
        }

        units.push(DeploymentUnit {
            service_key: key.clone(),
            app_name,
            image,
            has_persistent_data: !config.volumes.is_empty(),
            config,
        });
    }

    check_name_conflicts(&units)?;
    Ok(units)
}

fn check_name_conflicts(units: &[DeploymentUnit]) -> Result<(), AppError> {
    let mut claims: Vec<(&str, Vec<String>)> = Vec::new();
    for unit in units {
        match claims.iter_mut().find(|(name, _)| *name == unit.app_name) {
            Some((_, services)) => services.push(unit.service_key.clone()),
            None => claims.push((unit.app_name.as_str(), vec![unit.service_key.clone()])),
        }
    }

    match claims.into_iter().find(|(_, services)| services.len() > 1) {
        Some((app_name, services)) => {
            Err(AppError::NamingConflict { app_name: app_name.to_string(), services })
        }
        None => Ok(()),
    }
}

fn parse_environment(key: &str, env: &Value) -> Result<Vec<EnvVar>, AppError> {
    match env {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(map) => map
            .iter()
            .map(|(name, value)| match (scalar_to_string(name), scalar_to_string(value)) {
                (Some(name), Some(value)) if !name.is_empty() => Ok(EnvVar::new(name, value)),
                _ => Err(AppError::validation(format!(
                    "Service '{}' has a non-scalar environment entry",
                    key
                ))),
            })
            .collect(),
        Value::Sequence(_) => {
            string_list(key, "environment", env)?.iter().map(|spec| EnvVar::parse(spec)).collect()
        }
        _ => Err(AppError::validation(format!(
            "Service '{}' environment must be a mapping or a list",
            key
        ))),
    }
}

fn string_list(key: &str, field: &str, node: &Value) -> Result<Vec<String>, AppError> {
    let invalid =
        || AppError::validation(format!("Service '{}' field '{}' must be a list of scalars", key, field));
    match node {
        Value::Sequence(items) => {
            items.iter().map(|item| scalar_to_string(item).ok_or_else(invalid)).collect()
        }
        _ => Err(invalid()),
    }
}

fn parse_port_field(key: &str, value: &Value) -> Result<u16, AppError> {
    scalar_to_string(value)
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .filter(|port| *port > 0)
        .ok_or_else(|| {
            AppError::validation(format!("Service '{}' has an invalid containerHttpPort", key))
        })
}

fn bool_field(key: &str, field: &str, value: &Value) -> Result<bool, AppError> {
    scalar_to_bool(value).ok_or_else(|| {
        AppError::validation(format!("Service '{}' field '{}' must be true or false", key, field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resolver::{ResolutionPass, Variables};
    use crate::testing::SequenceHex;

    const SHOP: &str = r#"
services:
  cache:
    image: redis:5
    volumes:
      - cache-data:/data
  web:
    image: app:1
    environment:
      $$cap_api_key: ""
"#;

    fn shop_options() -> TranslateOptions {
        TranslateOptions { namespace: "shop".into(), ..TranslateOptions::default() }
    }

    fn resolved_shop() -> BundleDocument {
        let variables: Variables = [("$$cap_api_key", "abc123")].into_iter().collect();
        ResolutionPass::new(&variables, SequenceHex::default()).resolve(SHOP).unwrap()
    }

    #[test]
    fn translates_shop_bundle_in_declared_order() {
        let units = translate(&resolved_shop(), &shop_options()).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].app_name, "cache-shop");
        assert!(units[0].has_persistent_data);
        assert_eq!(units[0].image, ImageSource::Image("redis:5".into()));
        assert_eq!(units[0].config.volumes, vec![Volume::named("cache-data", "/data")]);

        assert_eq!(units[1].app_name, "web-shop");
        assert!(!units[1].has_persistent_data);
        assert_eq!(units[1].config.env_vars, vec![EnvVar::new("api_key", "abc123")]);
        assert_eq!(units[1].config.expose_as_web_app, Some(true));
    }

    #[test]
    fn duplicate_derived_names_conflict() {
        let bundle = BundleDocument::parse(
            "services:\n  - key: web\n    image: a\n  - key: web\n    image: b\n",
        )
        .unwrap();

        match translate(&bundle, &shop_options()).unwrap_err() {
            AppError::NamingConflict { app_name, services } => {
                assert_eq!(app_name, "web-shop");
                assert_eq!(services, vec!["web".to_string(), "web".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn tokens_in_service_and_env_keys_are_substituted_before_translation() {
        let raw = "services:\n  $$cap_svc:\n    image: app:1\n    environment:\n      $$cap_mode_key: cluster\n";
        let variables: Variables =
            [("svc", "api"), ("mode_key", "MODE")].into_iter().collect();
        let bundle = ResolutionPass::new(&variables, SequenceHex::default()).resolve(raw).unwrap();

        let units = translate(&bundle, &shop_options()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].service_key, "api");
        assert_eq!(units[0].app_name, "api-shop");
        assert_eq!(units[0].config.env_vars, vec![EnvVar::new("MODE", "cluster")]);
    }

    #[test]
    fn service_keys_resolving_to_one_name_never_drop_a_service() {
        let raw = "services:\n  $$cap_a:\n    image: one\n  $$cap_b:\n    image: two\n";
        let variables: Variables = [("a", "web"), ("b", "web")].into_iter().collect();
        let err = ResolutionPass::new(&variables, SequenceHex::default()).resolve(raw).unwrap_err();
        assert!(matches!(err, AppError::NamingConflict { .. }));
    }

    #[test]
    fn explicit_name_colliding_with_derived_name_conflicts() {
        let bundle = BundleDocument::parse(
            "services:\n  web:\n    image: a\n  api:\n    image: b\n    caproverExtra:\n      appName: web-shop\n",
        )
        .unwrap();
        assert!(matches!(translate(&bundle, &shop_options()), Err(AppError::NamingConflict { .. })));
    }

    #[test]
    fn caller_app_name_beats_bundle_app_name() {
        let bundle = BundleDocument::parse(
            "services:\n  web:\n    image: a\n    caproverExtra:\n      appName: from-bundle\n",
        )
        .unwrap();
        let mut options = shop_options();
        options.app_names.insert("web".into(), "from-caller".into());

        let units = translate(&bundle, &options).unwrap();
        assert_eq!(units[0].app_name, "from-caller");
    }

    #[test]
    fn invalid_explicit_name_is_rejected() {
        let mut options = shop_options();
        options.app_names.insert("web".into(), "Not_Valid".into());
        let err = translate(&resolved_shop(), &options).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn overrides_extend_collections_and_replace_scalars() {
        let overrides = ServiceOverride::parse_map(
            "web:\n  environment:\n    api_key: override\n    EXTRA: '1'\n  volumes:\n    - web-data:/srv\n  exposeAsWebApp: false\n  image: app:2\n",
        )
        .unwrap();
        let options = TranslateOptions { overrides, ..shop_options() };

        let units = translate(&resolved_shop(), &options).unwrap();
        let web = &units[1];
        assert_eq!(
            web.config.env_vars,
            vec![EnvVar::new("api_key", "override"), EnvVar::new("EXTRA", "1")]
        );
        assert!(web.has_persistent_data);
        assert_eq!(web.config.expose_as_web_app, Some(false));
        assert_eq!(web.image, ImageSource::Image("app:2".into()));
        assert_eq!(units[0].config.volumes, vec![Volume::named("cache-data", "/data")]);
    }

    #[test]
    fn override_for_unknown_service_is_rejected() {
        let overrides = ServiceOverride::parse_map("worker:\n  instanceCount: 2\n").unwrap();
        let options = TranslateOptions { overrides, ..shop_options() };
        let err = translate(&resolved_shop(), &options).unwrap_err();
        assert!(matches!(err, AppError::Validation(message) if message.contains("worker")));
    }

    #[test]
    fn unknown_override_field_is_rejected() {
        let err = ServiceOverride::parse_map("web:\n  replicas: 2\n").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn parses_caprover_extra_fields() {
        let node: Value = serde_yaml::from_str(
            r#"
image: ignored
command: redis-server --appendonly yes
ports: ["6379:6379"]
environment: ["MODE=cluster"]
caproverExtra:
  containerHttpPort: '6379'
  notExposeAsWebApp: 'true'
  websocketSupport: true
  httpAuth:
    user: admin
    password: secret
  dockerfileLines:
    - FROM redis:7
"#,
        )
        .unwrap();

        let descriptor = ServiceDescriptor::from_yaml("redis", &node).unwrap();
        assert_eq!(descriptor.image, ImageSource::DockerfileLines(vec!["FROM redis:7".into()]));
        assert_eq!(descriptor.container_http_port, Some(6379));
        assert!(!descriptor.expose_as_web_app);
        assert_eq!(descriptor.websocket_support, Some(true));
        assert_eq!(
            descriptor.command,
            Some(vec!["redis-server".into(), "--appendonly".into(), "yes".into()])
        );
        assert_eq!(descriptor.ports, vec![PortMapping { host_port: 6379, container_port: 6379 }]);
        assert_eq!(descriptor.env_vars, vec![EnvVar::new("MODE", "cluster")]);
        assert_eq!(
            descriptor.http_auth,
            Some(HttpAuth::new("admin", "secret"))
        );
    }

    #[test]
    fn service_without_image_is_rejected() {
        let node: Value = serde_yaml::from_str("environment: {A: b}").unwrap();
        assert!(matches!(ServiceDescriptor::from_yaml("x", &node), Err(AppError::Validation(_))));
    }

    #[test]
    fn malformed_volume_is_a_validation_error() {
        let bundle =
            BundleDocument::parse("services:\n  db:\n    image: pg\n    volumes: [nocolon]\n").unwrap();
        assert!(matches!(translate(&bundle, &shop_options()), Err(AppError::Validation(_))));
    }
}
