//! Validation and escaping of untrusted strings embedded in generated scripts
//!
//! Every value interpolated into an AppleScript or JXA string literal goes
//! through [`sanitize`]: the value is validated against a [`Policy`] first and
//! only then escaped for the target [`Dialect`]. Template builders accept the
//! resulting [`Sanitized`] type only, so raw caller input cannot reach them.
//!
//! The deny patterns are a heuristic second line of defense. They do not
//! claim completeness against deliberate obfuscation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::script::Dialect;

pub const APP_NAME_MAX_CHARS: usize = 100;
pub const UI_IDENTIFIER_MAX_CHARS: usize = 500;

/// Named validation rule set for an interpolated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    AppName,
    UiIdentifier,
}

impl Policy {
    pub fn max_chars(self) -> usize {
        match self {
            Policy::AppName => APP_NAME_MAX_CHARS,
            Policy::UiIdentifier => UI_IDENTIFIER_MAX_CHARS,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::AppName => f.write_str("application name"),
            Policy::UiIdentifier => f.write_str("UI identifier"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("{policy} must be a string, got {found}")]
    NotAString { policy: Policy, found: &'static str },

    #[error("{policy} is too long ({len} characters, max {max})")]
    TooLong { policy: Policy, len: usize, max: usize },

    #[error("{policy} contains a forbidden pattern: {pattern}")]
    Forbidden {
        policy: Policy,
        pattern: &'static str,
    },

    #[error("application name contains invalid characters")]
    InvalidCharacters,

    #[error("UI identifier must not contain quote characters")]
    QuoteCharacter,
}

/// (regex, human readable label)
const DENY_PATTERNS: &[(&str, &str)] = &[
    (r"--", "comment delimiter '--'"),
    (r"/\*", "comment delimiter '/*'"),
    (r"\*/", "comment delimiter '*/'"),
    (r";", "statement separator ';'"),
    (r"\breturn\b", "keyword 'return'"),
    (r"\bfunction\b", "keyword 'function'"),
    (r"\bconst\b", "keyword 'const'"),
    (r"\bvar\b", "keyword 'var'"),
    (r"\blet\b", "keyword 'let'"),
    (r"\beval\b", "'eval'"),
    (r"\bdo\s*shell", "'do shell script'"),
    (r"\bsystem\b", "'system'"),
    (r"\bexec\b", "'exec'"),
];

static DENY_REGEXES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DENY_PATTERNS
        .iter()
        .map(|(pattern, label)| {
            let re = Regex::new(&format!("(?i){}", pattern)).expect("valid deny pattern");
            (re, *label)
        })
        .collect()
});

static APP_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\s\-.()\[\]]+$").expect("valid app name pattern"));

/// Check `value` against `policy`, stopping at the first violation.
pub fn validate(value: &str, policy: Policy) -> Result<(), SanitizeError> {
    let len = value.chars().count();
    let max = policy.max_chars();
    if len > max {
        return Err(SanitizeError::TooLong { policy, len, max });
    }

    if let Some((_, label)) = DENY_REGEXES.iter().find(|(re, _)| re.is_match(value)) {
        return Err(SanitizeError::Forbidden {
            policy,
            pattern: label,
        });
    }

    match policy {
        Policy::AppName => {
            if !APP_NAME_CHARS.is_match(value) {
                return Err(SanitizeError::InvalidCharacters);
            }
        }
        Policy::UiIdentifier => {
            if value.contains(['"', '\'']) {
                return Err(SanitizeError::QuoteCharacter);
            }
        }
    }

    Ok(())
}

/// Validate a JSON parameter that is expected to hold a string.
pub fn validate_value(value: &Value, policy: Policy) -> Result<&str, SanitizeError> {
    let Some(s) = value.as_str() else {
        return Err(SanitizeError::NotAString {
            policy,
            found: json_type_name(value),
        });
    };
    validate(s, policy)?;
    Ok(s)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Escape a validated value for use inside a double-quoted literal of `dialect`.
///
/// Backslash is handled before the quote so an inserted escape is never
/// doubled, and control characters without a two-character form are dropped.
pub fn escape(value: &str, dialect: Dialect) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' if dialect == Dialect::Jxa => out.push_str("\\b"),
            '\u{c}' if dialect == Dialect::Jxa => out.push_str("\\f"),
            c if c < ' ' => {}
            c => out.push(c),
        }
    }
    out
}

/// A value that passed [`validate`] and was escaped for one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    text: String,
    dialect: Dialect,
}

impl Sanitized {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl fmt::Display for Sanitized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Validate then escape.
pub fn sanitize(value: &str, policy: Policy, dialect: Dialect) -> Result<Sanitized, SanitizeError> {
    validate(value, policy)?;
    Ok(Sanitized {
        text: escape(value, dialect),
        dialect,
    })
}
