//! Variable resolution for bundle documents.
//!
//! A [`ResolutionPass`] scans the serialized document for tokens, settles a value for
//! each distinct token text, then rewrites every string node of the tree in one go.
//! Nothing is substituted unless every token resolved, and substituted values stay
//! strings (`007` is not re-read as a number).

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::domain::bundle::{BundleDocument, VariableDeclaration};
use crate::domain::token::{VariableToken, normalize_key, scan, token_pattern};
use crate::domain::AppError;
use crate::ports::VariablePrompter;

/// Source of random lowercase hex, scoped to one resolution pass.
pub trait HexSource {
    fn hex(&mut self, len: usize) -> String;
}

/// Hex from the thread-local CSPRNG.
#[derive(Debug, Default)]
pub struct ThreadRngHex;

impl HexSource for ThreadRngHex {
    fn hex(&mut self, len: usize) -> String {
        const HEX_DIGITS: &[u8] = b"0123456789abcdef";
        let mut rng = rand::thread_rng();
        (0..len).map(|_| HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())] as char).collect()
    }
}

/// Caller-supplied variable values keyed by full token text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; `api_key` and `$$cap_api_key` address the same variable.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(normalize_key(key), value.into());
    }

    /// Insert only when the caller has not supplied the variable already.
    pub fn insert_default(&mut self, key: &str, value: impl Into<String>) {
        self.0.entry(normalize_key(key)).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&normalize_key(key)).map(String::as_str)
    }

    /// Parse `name=value` pairs as given on the command line.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self, AppError> {
        let mut variables = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                AppError::validation(format!("Variable '{}' must be name=value", pair))
            })?;
            if key.trim().is_empty() {
                return Err(AppError::validation(format!("Variable '{}' has an empty name", pair)));
            }
            variables.insert(key, value);
        }
        Ok(variables)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variables = Self::new();
        for (key, value) in iter {
            variables.insert(key.as_ref(), value);
        }
        variables
    }
}

/// Resolve `raw` with a fresh random source. `prompter` enables interactive mode.
pub fn resolve(
    raw: &str,
    variables: &Variables,
    prompter: Option<&dyn VariablePrompter>,
) -> Result<BundleDocument, AppError> {
    let mut pass = ResolutionPass::new(variables, ThreadRngHex);
    if let Some(prompter) = prompter {
        pass = pass.interactive(prompter);
    }
    pass.resolve(raw)
}

/// State of one resolution pass: the random cache lives and dies with it.
pub struct ResolutionPass<'a, H: HexSource> {
    variables: &'a Variables,
    prompter: Option<&'a dyn VariablePrompter>,
    hex: H,
    generated: HashMap<String, String>,
}

impl<'a, H: HexSource> ResolutionPass<'a, H> {
    pub fn new(variables: &'a Variables, hex: H) -> Self {
        Self { variables, prompter: None, hex, generated: HashMap::new() }
    }

    pub fn interactive(mut self, prompter: &'a dyn VariablePrompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn resolve(mut self, raw: &str) -> Result<BundleDocument, AppError> {
        let mut document = BundleDocument::parse(raw)?;
        let declarations: Vec<VariableDeclaration> = document.variable_declarations();
        document.normalize_env_shorthand();

        let text = document.to_yaml()?;
        let tokens = order_by_declaration(scan(&text)?, &declarations);

        let mut values: HashMap<String, String> = HashMap::with_capacity(tokens.len());
        for token in &tokens {
            let declaration = declarations.iter().find(|decl| decl.id == token.text());
            let value = self.value_for(token, declaration)?;
            if let Some(declaration) = declaration {
                check_valid_regex(declaration, &value)?;
            }
            values.insert(token.text().to_string(), value);
        }
        debug!(tokens = tokens.len(), "resolved bundle variables");

        document.rewrite_strings(|node| substitute(node, &values))?;
        Ok(document)
    }

    fn value_for(
        &mut self,
        token: &VariableToken,
        declaration: Option<&VariableDeclaration>,
    ) -> Result<String, AppError> {
        if let Some(value) = self.variables.get(token.text()) {
            return Ok(value.to_string());
        }

        if let VariableToken::RandomHex { text, len } = token {
            return Ok(self.random(text, *len));
        }

        let default = match declaration.and_then(|decl| decl.default_value.as_deref()) {
            Some(default) => Some(self.expand_default(default)?),
            None => None,
        };

        match (self.prompter, default) {
            (Some(prompter), default) => prompter.prompt_with_default(token.text(), default.as_deref()),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(AppError::VariableMissing { token: token.text().to_string() }),
        }
    }

    fn random(&mut self, text: &str, len: usize) -> String {
        if let Some(value) = self.generated.get(text) {
            return value.clone();
        }
        let value = self.hex.hex(len);
        self.generated.insert(text.to_string(), value.clone());
        value
    }

    /// Defaults may themselves hold random tokens or reference supplied variables.
    fn expand_default(&mut self, default: &str) -> Result<String, AppError> {
        let mut values = HashMap::new();
        for token in scan(default)? {
            let value = match &token {
                VariableToken::RandomHex { text, len } => self.random(text, *len),
                VariableToken::Named(text) => match self.variables.get(text) {
                    Some(value) => value.to_string(),
                    None => continue,
                },
            };
            values.insert(token.text().to_string(), value);
        }
        Ok(substitute(default, &values))
    }
}

fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    token_pattern()
        .replace_all(text, |captures: &Captures| {
            values.get(&captures[0]).cloned().unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// Declared variables first, in declaration order, then the rest as found.
fn order_by_declaration(
    mut tokens: Vec<VariableToken>,
    declarations: &[VariableDeclaration],
) -> Vec<VariableToken> {
    let rank = |token: &VariableToken| {
        declarations.iter().position(|decl| decl.id == token.text()).unwrap_or(usize::MAX)
    };
    tokens.sort_by_key(rank);
    tokens
}

fn check_valid_regex(declaration: &VariableDeclaration, value: &str) -> Result<(), AppError> {
    let Some(raw) = declaration.valid_regex.as_deref() else {
        return Ok(());
    };
    let pattern = raw.strip_prefix('/').and_then(|rest| rest.strip_suffix('/')).unwrap_or(raw);

    match Regex::new(pattern) {
        Ok(regex) if regex.is_match(value) => Ok(()),
        Ok(_) => Err(AppError::validation(format!(
            "Value for '{}' does not match {}",
            declaration.label.as_deref().unwrap_or(&declaration.id),
            raw
        ))),
        Err(err) => {
            warn!(variable = %declaration.id, error = %err, "skipping unsupported validRegex");
            Ok(())
        }
    }
}
