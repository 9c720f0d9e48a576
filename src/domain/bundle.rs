//! One-click app bundle documents.

use serde_yaml::{Mapping, Value};

use crate::domain::AppError;
use crate::domain::token::{as_named_token, token_name};

const SERVICES_KEY: &str = "services";
const ONE_CLICK_KEY: &str = "caproverOneClickApp";

/// Parsed bundle definition: a tree of mapping, sequence and scalar nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleDocument {
    root: Value,
}

/// A `caproverOneClickApp.variables` entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariableDeclaration {
    pub id: String,
    pub label: Option<String>,
    pub default_value: Option<String>,
    pub valid_regex: Option<String>,
}

impl BundleDocument {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let root: Value =
            serde_yaml::from_str(raw).map_err(|e| AppError::TemplateParse(e.to_string()))?;
        if !root.is_mapping() {
            return Err(AppError::TemplateParse(
                "top level of a bundle must be a mapping".to_string(),
            ));
        }
        Ok(Self { root })
    }

    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(&self.root).map_err(|e| AppError::TemplateParse(e.to_string()))
    }

    /// Declared services in document order, keyed by service key.
    ///
    /// Accepts a mapping (`key: descriptor`) or a sequence of descriptors carrying `key`.
    pub fn services(&self) -> Result<Vec<(String, &Value)>, AppError> {
        let services = self
            .root
            .get(SERVICES_KEY)
            .ok_or_else(|| AppError::TemplateParse("bundle declares no services".to_string()))?;

        let entries = match services {
            Value::Mapping(map) => map
                .iter()
                .map(|(key, descriptor)| {
                    scalar_to_string(key)
                        .map(|key| (key, descriptor))
                        .ok_or_else(|| AppError::TemplateParse("service key must be a scalar".into()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Sequence(items) => items
                .iter()
                .map(|descriptor| {
                    descriptor
                        .get("key")
                        .and_then(scalar_to_string)
                        .map(|key| (key, descriptor))
                        .ok_or_else(|| {
                            AppError::TemplateParse("service entry is missing 'key'".into())
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(AppError::TemplateParse(
                    "'services' must be a mapping or a sequence".to_string(),
                ));
            }
        };

        if entries.is_empty() {
            return Err(AppError::TemplateParse("bundle declares no services".to_string()));
        }
        Ok(entries)
    }

    pub fn variable_declarations(&self) -> Vec<VariableDeclaration> {
        let Some(Value::Sequence(items)) =
            self.root.get(ONE_CLICK_KEY).and_then(|meta| meta.get("variables"))
        else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let id = item.get("id").and_then(scalar_to_string)?;
                Some(VariableDeclaration {
                    id,
                    label: item.get("label").and_then(scalar_to_string),
                    default_value: item.get("defaultValue").and_then(scalar_to_string),
                    valid_regex: item.get("validRegex").and_then(scalar_to_string),
                })
            })
            .collect()
    }

    pub fn display_name(&self) -> Option<String> {
        self.root.get(ONE_CLICK_KEY).and_then(|meta| meta.get("displayName")).and_then(scalar_to_string)
    }

    /// Post-deploy instructions for the operator.
    pub fn end_instructions(&self) -> Option<String> {
        self.root
            .get(ONE_CLICK_KEY)
            .and_then(|meta| meta.get("instructions"))
            .and_then(|instructions| instructions.get("end"))
            .and_then(scalar_to_string)
    }

    /// Apply a textual rewrite to every string node, mapping keys included.
    ///
    /// Fails when two keys of one mapping become equal. Colliding service keys are
    /// a naming conflict; any other collision is a parse error.
    pub fn rewrite_strings<F: FnMut(&str) -> String>(&mut self, mut rewrite: F) -> Result<(), AppError> {
        rewrite_value(&mut self.root, &mut rewrite, Level::Root)
    }

    /// Rewrite `environment` entries whose key is a bare token with no value.
    ///
    /// `$$cap_api_key: ""` becomes `api_key: $$cap_api_key`, so the variable name
    /// survives substitution as the env key.
    pub fn normalize_env_shorthand(&mut self) {
        let Some(services) = self.root.get_mut(SERVICES_KEY) else {
            return;
        };

        let descriptors: Vec<&mut Value> = match services {
            Value::Mapping(map) => map.values_mut().collect(),
            Value::Sequence(items) => items.iter_mut().collect(),
            _ => return,
        };

        for descriptor in descriptors {
            if let Some(Value::Mapping(env)) = descriptor.get_mut("environment") {
                *env = normalize_env_mapping(env);
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Services,
    Nested,
}

fn rewrite_value<F: FnMut(&str) -> String>(
    value: &mut Value,
    rewrite: &mut F,
    level: Level,
) -> Result<(), AppError> {
    match value {
        Value::String(text) => *text = rewrite(text),
        Value::Sequence(items) => {
            for item in items {
                rewrite_value(item, rewrite, Level::Nested)?;
            }
        }
        Value::Mapping(map) => {
            let entries = std::mem::take(map);
            let mut sources: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
            for (mut key, mut item) in entries {
                let source = key.clone();
                rewrite_value(&mut key, rewrite, Level::Nested)?;
                let child = if level == Level::Root && key.as_str() == Some(SERVICES_KEY) {
                    Level::Services
                } else {
                    Level::Nested
                };
                rewrite_value(&mut item, rewrite, child)?;

                if let Some((_, earlier)) = sources.iter().find(|(rewritten, _)| *rewritten == key) {
                    return Err(key_collision(level, &key, earlier, &source));
                }
                sources.push((key.clone(), source));
                map.insert(key, item);
            }
        }
        Value::Tagged(tagged) => rewrite_value(&mut tagged.value, rewrite, level)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

fn key_collision(level: Level, key: &Value, earlier: &Value, later: &Value) -> AppError {
    let render = |value: &Value| scalar_to_string(value).unwrap_or_else(|| format!("{:?}", value));
    if level == Level::Services {
        return AppError::NamingConflict {
            app_name: render(key),
            services: vec![render(earlier), render(later)],
        };
    }
    AppError::TemplateParse(format!(
        "keys '{}' and '{}' both resolve to '{}'",
        render(earlier),
        render(later),
        render(key)
    ))
}

fn normalize_env_mapping(env: &Mapping) -> Mapping {
    env.iter()
        .map(|(key, value)| {
            let shorthand = key.as_str().and_then(as_named_token).filter(|_| is_blank(value));
            match shorthand {
                Some(token) => {
                    (Value::String(token_name(token).to_string()), Value::String(token.to_string()))
                }
                None => (key.clone(), value.clone()),
            }
        })
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Render a scalar node as text. Mappings and sequences have no scalar form.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Interpret a YAML bool, accepting the quoted `'true'`/`'false'` bundles often use.
pub fn scalar_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"
captainVersion: 4
services:
  cache:
    image: redis:5
  web:
    image: app:1
    environment:
      $$cap_api_key: ""
      LOG_LEVEL: info
caproverOneClickApp:
  displayName: Shop
  instructions:
    end: Visit $$cap_appname
  variables:
    - id: $$cap_api_key
      label: API key
      defaultValue: changeme
      validRegex: /^\w+$/
"#;

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(BundleDocument::parse("services: [unclosed"), Err(AppError::TemplateParse(_))));
        assert!(matches!(BundleDocument::parse("- just\n- a list"), Err(AppError::TemplateParse(_))));
    }

    #[test]
    fn lists_services_in_document_order() {
        let doc = BundleDocument::parse(BUNDLE).unwrap();
        let keys: Vec<String> = doc.services().unwrap().into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["cache", "web"]);
    }

    #[test]
    fn sequence_services_keep_duplicates_for_conflict_detection() {
        let doc = BundleDocument::parse("services:\n  - key: web\n    image: a\n  - key: web\n    image: b\n")
            .unwrap();
        assert_eq!(doc.services().unwrap().len(), 2);
    }

    #[test]
    fn missing_services_is_a_parse_error() {
        let doc = BundleDocument::parse("captainVersion: 4\n").unwrap();
        assert!(matches!(doc.services(), Err(AppError::TemplateParse(_))));
    }

    #[test]
    fn reads_variable_declarations() {
        let doc = BundleDocument::parse(BUNDLE).unwrap();
        let declarations = doc.variable_declarations();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].id, "$$cap_api_key");
        assert_eq!(declarations[0].default_value.as_deref(), Some("changeme"));
        assert_eq!(declarations[0].valid_regex.as_deref(), Some(r"/^\w+$/"));
        assert_eq!(doc.display_name().as_deref(), Some("Shop"));
    }

    #[test]
    fn normalizes_bare_token_env_keys() {
        let mut doc = BundleDocument::parse(BUNDLE).unwrap();
        doc.normalize_env_shorthand();

        let services = doc.services().unwrap();
        let env = services[1].1.get("environment").unwrap();
        assert_eq!(env.get("api_key").and_then(Value::as_str), Some("$$cap_api_key"));
        assert_eq!(env.get("LOG_LEVEL").and_then(Value::as_str), Some("info"));
        assert!(env.get("$$cap_api_key").is_none());
    }

    #[test]
    fn rewrites_keys_and_values_without_touching_types() {
        let mut doc = BundleDocument::parse("services:\n  $$cap_x:\n    image: $$cap_x\n    replicas: 2\n").unwrap();
        doc.rewrite_strings(|text| text.replace("$$cap_x", "007")).unwrap();

        let services = doc.services().unwrap();
        assert_eq!(services[0].0, "007");
        assert_eq!(services[0].1.get("image"), Some(&Value::String("007".into())));
        assert_eq!(services[0].1.get("replicas").and_then(Value::as_u64), Some(2));
    }

    #[test]
    fn service_keys_that_resolve_alike_conflict() {
        let mut doc =
            BundleDocument::parse("services:\n  $$cap_a:\n    image: one\n  $$cap_b:\n    image: two\n").unwrap();
        let err = doc.rewrite_strings(|text| text.replace("$$cap_a", "web").replace("$$cap_b", "web")).unwrap_err();

        match err {
            AppError::NamingConflict { app_name, services } => {
                assert_eq!(app_name, "web");
                assert_eq!(services, vec!["$$cap_a".to_string(), "$$cap_b".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn env_keys_that_resolve_alike_are_rejected() {
        let mut doc = BundleDocument::parse(
            "services:\n  web:\n    image: app\n    environment:\n      $$cap_k: a\n      MODE: b\n",
        )
        .unwrap();
        let err = doc.rewrite_strings(|text| text.replace("$$cap_k", "MODE")).unwrap_err();
        assert!(matches!(err, AppError::TemplateParse(message) if message.contains("'MODE'")));
    }

    #[test]
    fn scalar_helpers_accept_quoted_values() {
        assert_eq!(scalar_to_bool(&Value::String("true".into())), Some(true));
        assert_eq!(scalar_to_bool(&Value::Bool(false)), Some(false));
        assert_eq!(scalar_to_bool(&Value::String("maybe".into())), None);
        assert_eq!(scalar_to_string(&serde_yaml::from_str::<Value>("8080").unwrap()).as_deref(), Some("8080"));
    }
}
