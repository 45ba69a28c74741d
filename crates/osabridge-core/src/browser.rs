//! Default web browser lookup

use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::executor::ScriptExecutor;
use crate::sanitize::{Policy, sanitize};
use crate::script::Dialect;
use crate::templates;

pub const SAFARI_BUNDLE_ID: &str = "com.apple.Safari";

const HANDLER_ROLES: [&str; 3] = ["LSHandlerRoleAll", "LSHandlerRoleViewer", "LSHandlerRoleEditor"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultBrowser {
    pub name: String,
    pub bundle_id: String,
}

fn launch_services_plist() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join("Library/Preferences/com.apple.LaunchServices/com.apple.launchservices.secure.plist")
    })
}

/// Bundle id registered for `scheme` in a decoded LaunchServices plist
pub fn handler_for_scheme(plist: &Value, scheme: &str) -> Option<String> {
    plist
        .get("LSHandlers")?
        .as_array()?
        .iter()
        .filter(|entry| entry.get("LSHandlerURLScheme").and_then(Value::as_str) == Some(scheme))
        .flat_map(|entry| HANDLER_ROLES.iter().filter_map(|role| entry.get(*role)?.as_str()))
        .find(|id| !id.is_empty() && *id != "-")
        .map(str::to_string)
}

/// LaunchServices lower-cases some ids; Finder lookups want Safari's canonical form.
pub fn normalize_bundle_id(bundle_id: &str) -> String {
    if bundle_id.eq_ignore_ascii_case(SAFARI_BUNDLE_ID) {
        SAFARI_BUNDLE_ID.to_string()
    } else {
        bundle_id.to_string()
    }
}

/// Well-known name guessed from the bundle id
pub fn fallback_name(bundle_id: &str) -> &'static str {
    let id = bundle_id.to_lowercase();
    if id.contains("chrome") {
        "Google Chrome"
    } else if id.contains("firefox") {
        "Firefox"
    } else if id.contains("edge") {
        "Microsoft Edge"
    } else {
        "Safari"
    }
}

async fn read_handlers(executor: &ScriptExecutor) -> Option<Value> {
    let plist = launch_services_plist()?;
    let args = vec![
        "-convert".to_string(),
        "json".to_string(),
        "-o".to_string(),
        "-".to_string(),
        plist.to_string_lossy().into_owned(),
    ];
    let output = executor
        .runner()
        .run("plutil", &args, executor.config().default_timeout)
        .await
        .ok()
        .filter(|output| output.success)?;
    serde_json::from_slice(&output.stdout).ok()
}

async fn resolve_name(executor: &ScriptExecutor, bundle_id: &str) -> Option<String> {
    let safe = match sanitize(bundle_id, Policy::AppName, Dialect::AppleScript) {
        Ok(safe) => safe,
        Err(e) => {
            debug!("Not resolving bundle id through Finder: {}", e);
            return None;
        }
    };
    let name = executor
        .run_default(&templates::app_name_for_bundle_id(&safe))
        .await
        .ok()?
        .into_output()
        .ok()?;
    let name = name.strip_suffix(".app").unwrap_or(&name).trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Default browser for https (then http), Safari when nothing is registered.
/// Never fails: every lookup step has a fallback.
pub async fn default_browser(executor: &ScriptExecutor) -> DefaultBrowser {
    let bundle_id = read_handlers(executor)
        .await
        .and_then(|plist| handler_for_scheme(&plist, "https").or_else(|| handler_for_scheme(&plist, "http")))
        .map(|id| normalize_bundle_id(&id))
        .unwrap_or_else(|| SAFARI_BUNDLE_ID.to_string());

    let name = match resolve_name(executor, &bundle_id).await {
        Some(name) => name,
        None => fallback_name(&bundle_id).to_string(),
    };
    debug!("Default browser: {} ({})", name, bundle_id);

    DefaultBrowser { name, bundle_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::executor::tests::FakeRunner;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_handler_for_scheme() {
        let plist = json!({
            "LSHandlers": [
                {"LSHandlerURLScheme": "mailto", "LSHandlerRoleAll": "com.apple.mail"},
                {"LSHandlerURLScheme": "https", "LSHandlerRoleAll": "-", "LSHandlerRoleViewer": "com.google.chrome"},
                {"LSHandlerURLScheme": "http", "LSHandlerRoleAll": "org.mozilla.firefox"}
            ]
        });
        assert_eq!(handler_for_scheme(&plist, "https").as_deref(), Some("com.google.chrome"));
        assert_eq!(handler_for_scheme(&plist, "http").as_deref(), Some("org.mozilla.firefox"));
        assert_eq!(handler_for_scheme(&plist, "ftp"), None);
        assert_eq!(handler_for_scheme(&json!([]), "https"), None);
    }

    #[test]
    fn test_normalize_and_fallback() {
        assert_eq!(normalize_bundle_id("com.apple.safari"), SAFARI_BUNDLE_ID);
        assert_eq!(normalize_bundle_id("com.google.Chrome"), "com.google.Chrome");
        assert_eq!(fallback_name("com.google.Chrome"), "Google Chrome");
        assert_eq!(fallback_name("org.mozilla.firefox"), "Firefox");
        assert_eq!(fallback_name("com.microsoft.edgemac"), "Microsoft Edge");
        assert_eq!(fallback_name("com.example.unknown"), "Safari");
    }

    #[tokio::test]
    async fn test_falls_back_to_safari_when_tools_fail() {
        let runner = Arc::new(FakeRunner::failing("no such file"));
        let executor = ScriptExecutor::with_runner(ExecutorConfig::default(), runner);
        let browser = default_browser(&executor).await;
        assert_eq!(browser.bundle_id, SAFARI_BUNDLE_ID);
        assert_eq!(browser.name, "Safari");
    }
}
