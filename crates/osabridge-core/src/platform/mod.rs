//! Platform automation collaborator
//!
//! Pointer, keyboard, clipboard and screen capture primitives behind the
//! [`Automation`] trait. On macOS these are thin wrappers over `cliclick`,
//! `screencapture`, `sips` and the clipboard; elsewhere every primitive
//! returns an error so the bridge still answers each command.

pub mod keys;
#[cfg(target_os = "macos")]
pub mod macos;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::executor::ScriptExecutor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Screen point in logical (non-Retina) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Integer pixel form used by command-line input tools
    pub fn rounded(self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screenshot {
    /// Base64-encoded JPEG
    pub data: String,
    pub mouse_position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
    pub physical_width: u32,
    pub physical_height: u32,
    pub scale: f64,
}

/// How text reached the focused element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    Clipboard,
    Keystroke,
}

impl InputMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMethod::Clipboard => "clipboard",
            InputMethod::Keystroke => "keystroke",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Path or name of the `cliclick` binary
    pub cliclick: String,
    /// Timeout for helper tools (cliclick, screencapture, sips)
    pub tool_timeout: Duration,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            cliclick: "cliclick".to_string(),
            tool_timeout: Duration::from_secs(15),
        }
    }
}

/// Most clicks one `click` may request (single, double, triple)
pub const MAX_CLICKS: u32 = 3;

/// Input and screen primitives. Implementations own the cursor-visibility state.
#[async_trait]
pub trait Automation: Send + Sync {
    async fn click(&self, at: Point, clicks: u32, button: MouseButton) -> Result<()>;
    async fn move_pointer(&self, to: Point) -> Result<()>;
    async fn drag(&self, from: Point, to: Point, duration: Duration, button: MouseButton) -> Result<()>;
    /// Positive scrolls up, negative down
    async fn scroll(&self, amount: i32) -> Result<()>;
    async fn press_key(&self, key: &str) -> Result<()>;
    async fn hotkey(&self, keys: &[String]) -> Result<()>;
    async fn type_text(&self, text: &str) -> Result<InputMethod>;
    async fn screenshot(&self, quality: u8) -> Result<Screenshot>;
    async fn screen_size(&self) -> Result<ScreenSize>;

    fn set_cursor_visible(&self, visible: bool);
    fn cursor_visible(&self) -> bool;
}

/// Cursor-visibility flag shared by the implementations
#[derive(Debug)]
pub struct CursorState(AtomicBool);

impl CursorState {
    pub fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.store(visible, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CursorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-platform clipboard using `arboard` crate
pub struct CrossPlatformClipboard;

impl CrossPlatformClipboard {
    pub async fn set_text(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| anyhow::anyhow!("Failed to access clipboard: {}", e))?;
            clipboard
                .set_text(text)
                .map_err(|e| anyhow::anyhow!("Failed to write clipboard: {}", e))
        })
        .await?
    }
}

/// Fallback for platforms without an input backend
#[derive(Default)]
pub struct UnsupportedAutomation {
    cursor: CursorState,
}

fn unsupported<T>(what: &str) -> Result<T> {
    Err(anyhow::anyhow!("{} is only available on macOS", what))
}

#[async_trait]
impl Automation for UnsupportedAutomation {
    async fn click(&self, _at: Point, _clicks: u32, _button: MouseButton) -> Result<()> {
        unsupported("Pointer click")
    }

    async fn move_pointer(&self, _to: Point) -> Result<()> {
        unsupported("Pointer movement")
    }

    async fn drag(&self, _from: Point, _to: Point, _duration: Duration, _button: MouseButton) -> Result<()> {
        unsupported("Drag")
    }

    async fn scroll(&self, _amount: i32) -> Result<()> {
        unsupported("Scrolling")
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        unsupported("Key press")
    }

    async fn hotkey(&self, _keys: &[String]) -> Result<()> {
        unsupported("Hotkeys")
    }

    async fn type_text(&self, _text: &str) -> Result<InputMethod> {
        unsupported("Typing")
    }

    async fn screenshot(&self, _quality: u8) -> Result<Screenshot> {
        unsupported("Screen capture")
    }

    async fn screen_size(&self) -> Result<ScreenSize> {
        unsupported("Screen size")
    }

    fn set_cursor_visible(&self, visible: bool) {
        self.cursor.set_visible(visible);
    }

    fn cursor_visible(&self) -> bool {
        self.cursor.is_visible()
    }
}

/// `cliclick` coordinate pair; negative values need the `=` prefix.
pub fn cliclick_coords(at: Point) -> String {
    let (x, y) = at.rounded();
    let fmt = |v: i64| if v < 0 { format!("={}", v) } else { v.to_string() };
    format!("{},{}", fmt(x), fmt(y))
}

/// Parse `cliclick p` output, e.g. `512,384`.
pub fn parse_position(output: &str) -> Result<Point> {
    let (x, y) = output
        .trim()
        .split_once(',')
        .with_context(|| format!("Unexpected pointer position output: {}", output.trim()))?;
    Ok(Point::new(
        x.trim().parse().context("Invalid pointer x coordinate")?,
        y.trim().parse().context("Invalid pointer y coordinate")?,
    ))
}

/// Parse Finder desktop bounds (`0, 0, 1512, 982`) into a width and height.
pub fn parse_bounds(output: &str) -> Result<(u32, u32)> {
    let parts = output
        .split(',')
        .map(|p| p.trim().parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Unexpected desktop bounds: {}", output.trim()))?;
    match parts.as_slice() {
        [x1, y1, x2, y2] if x2 > x1 && y2 > y1 => Ok(((x2 - x1) as u32, (y2 - y1) as u32)),
        _ => anyhow::bail!("Unexpected desktop bounds: {}", output.trim()),
    }
}

/// Parse `sips -g pixelWidth -g pixelHeight` output.
pub fn parse_sips_dimensions(output: &str) -> Result<(u32, u32)> {
    let field = |name: &str| -> Result<u32> {
        output
            .lines()
            .filter_map(|line| line.trim().strip_prefix(name))
            .find_map(|rest| rest.trim_start_matches(':').trim().parse().ok())
            .with_context(|| format!("sips output is missing {}", name))
    };
    Ok((field("pixelWidth")?, field("pixelHeight")?))
}

/// Create the automation backend for this platform
pub fn create_automation(executor: Arc<ScriptExecutor>, config: AutomationConfig) -> Arc<dyn Automation> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacOsAutomation::new(executor, config))
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = (executor, config);
        Arc::new(UnsupportedAutomation::default())
    }
}
