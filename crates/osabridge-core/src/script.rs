//! Script programs handed to the OSA interpreter

use std::fmt;

use serde::{Deserialize, Serialize};

/// Literal-escaping rule set of a generated program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    AppleScript,
    Jxa,
}

impl Dialect {
    /// Interpreter flags selecting this dialect (placed before `-e`)
    pub fn interpreter_args(self) -> &'static [&'static str] {
        match self {
            Dialect::AppleScript => &[],
            Dialect::Jxa => &["-l", "JavaScript"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::AppleScript => "AppleScript",
            Dialect::Jxa => "JXA",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully assembled interpreter source, built per request and dropped after execution.
///
/// The source may contain user text, so `Debug` only reports the dialect and
/// length. Use [`ScriptProgram::source`] when the text itself is needed.
#[derive(PartialEq, Eq)]
pub struct ScriptProgram {
    dialect: Dialect,
    source: String,
}

impl ScriptProgram {
    pub fn new(dialect: Dialect, source: impl Into<String>) -> Self {
        Self {
            dialect,
            source: source.into(),
        }
    }

    pub fn applescript(source: impl Into<String>) -> Self {
        Self::new(Dialect::AppleScript, source)
    }

    pub fn jxa(source: impl Into<String>) -> Self {
        Self::new(Dialect::Jxa, source)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

impl fmt::Debug for ScriptProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProgram")
            .field("dialect", &self.dialect)
            .field("len", &self.source.len())
            .finish()
    }
}
