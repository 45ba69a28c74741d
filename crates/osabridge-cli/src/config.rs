use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use osabridge_core::{AutomationConfig, ExecutorConfig, HandlerConfig, InspectorConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub inspector: InspectorSection,
    #[serde(default)]
    pub platform: PlatformSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_element_timeout_secs")]
    pub element_timeout_secs: u64,
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
    #[serde(default = "default_max_stdout_chars")]
    pub max_stdout_chars: usize,
    #[serde(default = "default_max_stderr_chars")]
    pub max_stderr_chars: usize,
}

fn default_interpreter() -> String {
    "osascript".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_element_timeout_secs() -> u64 {
    5
}

fn default_max_timeout_secs() -> u64 {
    30
}

fn default_max_stdout_chars() -> usize {
    5000
}

fn default_max_stderr_chars() -> usize {
    1000
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            default_timeout_secs: default_timeout_secs(),
            element_timeout_secs: default_element_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            max_stdout_chars: default_max_stdout_chars(),
            max_stderr_chars: default_max_stderr_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectorSection {
    #[serde(default = "default_depth")]
    pub default_depth: u32,
    #[serde(default = "default_search_depth")]
    pub search_depth: u32,
    #[serde(default = "default_max_web_elements")]
    pub max_web_elements: u32,
}

fn default_depth() -> u32 {
    osabridge_core::templates::DEFAULT_INSPECT_DEPTH
}

fn default_search_depth() -> u32 {
    osabridge_core::templates::DEFAULT_SEARCH_DEPTH
}

fn default_max_web_elements() -> u32 {
    osabridge_core::templates::DEFAULT_MAX_WEB_ELEMENTS
}

impl Default for InspectorSection {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            search_depth: default_search_depth(),
            max_web_elements: default_max_web_elements(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformSection {
    #[serde(default = "default_cliclick_path")]
    pub cliclick_path: String,
    #[serde(default = "default_screenshot_quality")]
    pub screenshot_quality: u8,
}

fn default_cliclick_path() -> String {
    "cliclick".to_string()
}

fn default_screenshot_quality() -> u8 {
    osabridge_core::handlers::DEFAULT_SCREENSHOT_QUALITY
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            cliclick_path: default_cliclick_path(),
            screenshot_quality: default_screenshot_quality(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".osabridge")
}

impl BridgeConfig {
    /// Load from `custom_path`, or from the default location when present.
    ///
    /// A missing default file means built-in defaults; a missing explicit file is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let config = match custom_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_dir().join("config.toml");
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.executor;
        if e.interpreter.trim().is_empty() {
            bail!("executor.interpreter must not be empty");
        }
        if e.default_timeout_secs == 0 || e.element_timeout_secs == 0 || e.max_timeout_secs == 0 {
            bail!("executor timeouts must be positive");
        }
        if e.default_timeout_secs > e.max_timeout_secs || e.element_timeout_secs > e.max_timeout_secs {
            bail!(
                "executor timeouts must not exceed max_timeout_secs ({})",
                e.max_timeout_secs
            );
        }
        if !(1..=100).contains(&self.platform.screenshot_quality) {
            bail!("platform.screenshot_quality must be between 1 and 100");
        }
        if self.platform.cliclick_path.trim().is_empty() {
            bail!("platform.cliclick_path must not be empty");
        }
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let e = &self.executor;
        ExecutorConfig {
            interpreter: e.interpreter.clone(),
            default_timeout: Duration::from_secs(e.default_timeout_secs),
            element_timeout: Duration::from_secs(e.element_timeout_secs),
            max_timeout: Duration::from_secs(e.max_timeout_secs),
            max_stdout_chars: e.max_stdout_chars,
            max_stderr_chars: e.max_stderr_chars,
        }
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            inspector: InspectorConfig {
                default_depth: osabridge_core::templates::clamp_depth(self.inspector.default_depth),
                search_depth: osabridge_core::templates::clamp_depth(self.inspector.search_depth),
                max_web_elements: self.inspector.max_web_elements,
            },
            screenshot_quality: self.platform.screenshot_quality,
        }
    }

    pub fn automation_config(&self) -> AutomationConfig {
        AutomationConfig {
            cliclick: self.platform.cliclick_path.clone(),
            ..AutomationConfig::default()
        }
    }
}
