//! Placeholder token grammar.
//!
//! `$$cap_<identifier>` is a named variable. `$$cap_gen_random_hex_<n>` (and the
//! catalog form `$$cap_gen_random_hex(<n>)`) asks for `n` random lowercase hex chars.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::AppError;

pub const TOKEN_PREFIX: &str = "$$cap_";

/// Upper bound for generated hex, keeps a typo from allocating megabytes.
pub const MAX_RANDOM_HEX_LEN: usize = 4096;

/// A distinct token literal found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableToken {
    Named(String),
    RandomHex { text: String, len: usize },
}

impl VariableToken {
    /// The exact literal text, which is also the cache key within one pass.
    pub fn text(&self) -> &str {
        match self {
            VariableToken::Named(text) => text,
            VariableToken::RandomHex { text, .. } => text,
        }
    }
}

pub fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\$cap_(?:gen_random_hex(?:\((\d+)\)|_(\d+)\b)|[A-Za-z0-9_]+)")
            .expect("token pattern must compile")
    })
}

/// Collect distinct tokens in order of first appearance.
pub fn scan(text: &str) -> Result<Vec<VariableToken>, AppError> {
    let mut tokens: Vec<VariableToken> = Vec::new();

    for captures in token_pattern().captures_iter(text) {
        let literal = &captures[0];
        if tokens.iter().any(|token| token.text() == literal) {
            continue;
        }

        let token = match captures.get(1).or_else(|| captures.get(2)) {
            Some(digits) => {
                let len = digits
                    .as_str()
                    .parse::<usize>()
                    .ok()
                    .filter(|len| (1..=MAX_RANDOM_HEX_LEN).contains(len))
                    .ok_or_else(|| {
                        AppError::validation(format!(
                            "Random token '{}' must request between 1 and {} characters",
                            literal, MAX_RANDOM_HEX_LEN
                        ))
                    })?;
                VariableToken::RandomHex { text: literal.to_string(), len }
            }
            None => VariableToken::Named(literal.to_string()),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Whether `text` is exactly one named token and nothing else.
pub fn as_named_token(text: &str) -> Option<&str> {
    let found = token_pattern().captures(text)?;
    let whole = found.get(0)?;
    let is_exact = whole.start() == 0 && whole.end() == text.len();
    let is_named = found.get(1).is_none() && found.get(2).is_none();
    (is_exact && is_named).then_some(text)
}

/// Token text without the `$$cap_` prefix.
pub fn token_name(token: &str) -> &str {
    token.strip_prefix(TOKEN_PREFIX).unwrap_or(token)
}

/// Accept both `api_key` and `$$cap_api_key` as a variable key.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with(TOKEN_PREFIX) { key.to_string() } else { format!("{}{}", TOKEN_PREFIX, key) }
}
