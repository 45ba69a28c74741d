//! Whole-program checks for scripts that reach the interpreter
//!
//! Detection runs over a normalized copy (whitespace runs and `¬` line
//! continuations collapsed, lower case). The normalized text is never what
//! gets executed.
//!
//! Known limitation: string building at runtime (`"do " & "shell script"`)
//! and similar tricks are not detected. The catalog narrows the attack
//! surface of caller-supplied scripts, it does not close it.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("do shell script is not allowed: it would permit arbitrary shell command execution")]
    ShellInvocation,

    #[error("script blocked: contains a dangerous command pattern ({0})")]
    Destructive(&'static str),
}

// `¬` continues an AppleScript statement onto the next line
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s|\x{AC})+").expect("valid regex"));

// `sysoexec` is the raw Apple event code behind `do shell script`.
static SHELL_INVOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"do\s*shell\s*script|sysoexec").expect("valid regex")
});

/// (regex over normalized text, label)
const DESTRUCTIVE_PATTERNS: &[(&str, &str)] = &[
    (r"\brm\s+-rf\b", "recursive force delete"),
    (r"\brm\s+-fr\b", "recursive force delete"),
    (r"\brm\s+-r\s+/", "recursive delete from root"),
    (r"\bshutdown\b", "shutdown"),
    (r"\breboot\b", "reboot"),
    (r"\bhalt\b", "halt"),
    (r"\bpoweroff\b", "poweroff"),
    (r"\bkillall\b", "killall"),
    (r"\bkill\s+-9\b", "kill -9"),
    (r"\bmkfs", "filesystem creation"),
    (r"\bdd\s+if=", "raw disk copy"),
    (r">\s*/dev/", "device node redirection"),
    (r"\bchmod\s+0?000\b", "permission zeroing"),
    (r"\bchown\s+-r\b", "recursive ownership change"),
    (r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
    // trailing boundary only: catches `diskutil reformat`, not "information"
    (r"format\b", "disk formatting"),
    (r"\bdel\s+/f\b", "forced delete"),
    (r"\brmdir\s+/s\b", "recursive directory removal"),
];

static DESTRUCTIVE_REGEXES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DESTRUCTIVE_PATTERNS
        .iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("valid destructive pattern"), *label))
        .collect()
});

/// Collapse whitespace and continuation runs, then lower-case. Detection only.
pub fn normalize(script: &str) -> String {
    WHITESPACE.replace_all(script, " ").trim().to_lowercase()
}

/// Reject any form of `do shell script`. Applied to every program before it runs.
pub fn check_no_shell(script: &str) -> Result<(), GuardError> {
    if SHELL_INVOCATION.is_match(&normalize(script)) {
        return Err(GuardError::ShellInvocation);
    }
    Ok(())
}

/// Full check for caller-supplied scripts: shell invocation plus the destructive catalog.
pub fn check_script(script: &str) -> Result<(), GuardError> {
    let normalized = normalize(script);
    if SHELL_INVOCATION.is_match(&normalized) {
        return Err(GuardError::ShellInvocation);
    }
    if let Some((_, label)) = DESTRUCTIVE_REGEXES.iter().find(|(re, _)| re.is_match(&normalized)) {
        return Err(GuardError::Destructive(label));
    }
    Ok(())
}
