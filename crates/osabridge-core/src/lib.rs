//! osabridge-core - Safe AppleScript/JXA automation over a line protocol
//!
//! This crate provides:
//! - Validation and escaping of untrusted strings before they enter generated scripts
//! - Deterministic AppleScript/JXA template builders for UI inspection and interaction
//! - An interpreter executor with timeouts, output limits and a shell-invocation guard
//! - A newline-delimited JSON command loop with a closed set of actions
//! - Pointer, keyboard and screen capture primitives behind the `Automation` trait

pub mod actions;
pub mod browser;
pub mod dispatcher;
pub mod executor;
pub mod guard;
pub mod handlers;
pub mod platform;
pub mod protocol;
pub mod sanitize;
pub mod script;
pub mod templates;

// Re-export main types for convenience
pub use actions::{Action, ActionError, Request};
pub use dispatcher::{Dispatcher, Flow};
pub use executor::{ExecError, ExecutionOutcome, ExecutorConfig, ProcessRunner, ScriptExecutor, TokioProcessRunner};
pub use guard::GuardError;
pub use handlers::{HandlerConfig, Handlers, InspectorConfig};
pub use platform::{Automation, AutomationConfig, create_automation};
pub use protocol::{Command, ErrorType, Response};
pub use sanitize::{Policy, SanitizeError, Sanitized, sanitize};
pub use script::{Dialect, ScriptProgram};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Just verify that all main types are exported
        let _ = std::mem::size_of::<Dispatcher>();
        let _ = std::mem::size_of::<ScriptExecutor>();
        let _ = std::mem::size_of::<Handlers>();
        let _ = std::mem::size_of::<Response>();
        let _ = std::mem::size_of::<ScriptProgram>();
    }
}
