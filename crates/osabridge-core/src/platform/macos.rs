//! macOS automation using cliclick, screencapture and sips

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use super::{
    Automation, AutomationConfig, CrossPlatformClipboard, CursorState, InputMethod, MouseButton,
    MAX_CLICKS, Point, ScreenSize, Screenshot, cliclick_coords, keys, parse_bounds, parse_position,
    parse_sips_dimensions,
};
use crate::executor::ScriptExecutor;
use crate::templates;

/// Pause between writing the clipboard and pasting, and after the paste
const PASTE_SETTLE: Duration = Duration::from_millis(100);

pub struct MacOsAutomation {
    executor: Arc<ScriptExecutor>,
    config: AutomationConfig,
    cursor: CursorState,
    clipboard: CrossPlatformClipboard,
}

impl MacOsAutomation {
    pub fn new(executor: Arc<ScriptExecutor>, config: AutomationConfig) -> Self {
        Self {
            executor,
            config,
            cursor: CursorState::new(),
            clipboard: CrossPlatformClipboard,
        }
    }

    /// Run a helper tool, returning trimmed stdout
    async fn run_tool(&self, program: &str, args: Vec<String>) -> Result<String> {
        let output = self
            .executor
            .runner()
            .run(program, &args, self.config.tool_timeout)
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        if output.success {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!("{} failed: {}", program, stderr);
        let lower = stderr.to_lowercase();
        if lower.contains("accessibility") || lower.contains("not allowed") {
            bail!(
                "{} failed: Accessibility permission required (System Settings > Privacy & Security > Accessibility)",
                program
            );
        }
        bail!("{} failed: {}", program, stderr)
    }

    async fn cliclick(&self, args: Vec<String>) -> Result<String> {
        self.run_tool(&self.config.cliclick, args).await
    }

    async fn pointer_position(&self) -> Result<Point> {
        parse_position(&self.cliclick(vec!["p".to_string()]).await?)
    }

    /// Capture the main display into a fresh temporary JPEG
    async fn capture_to_temp(&self) -> Result<TempImage> {
        let image = TempImage::new();
        let mut args = vec!["-x".to_string()];
        if self.cursor.is_visible() {
            args.push("-C".to_string());
        }
        args.extend(["-t".to_string(), "jpg".to_string(), image.arg()]);
        self.run_tool("screencapture", args).await?;
        Ok(image)
    }
}

/// Screenshot file removed on drop
struct TempImage(PathBuf);

impl TempImage {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("osabridge-{}.jpg", uuid::Uuid::new_v4())))
    }

    fn arg(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", self.0.display(), e);
        }
    }
}

fn click_command(button: MouseButton, clicks: u32) -> Result<Vec<&'static str>> {
    let single = match button {
        MouseButton::Left => "c",
        MouseButton::Right => "rc",
        MouseButton::Middle => bail!("Middle-button clicks are not supported on macOS"),
    };
    if clicks > MAX_CLICKS {
        bail!("At most {} clicks per command", MAX_CLICKS);
    }
    Ok(match (button, clicks) {
        (_, 0) => Vec::new(),
        (MouseButton::Left, 2) => vec!["dc"],
        (MouseButton::Left, 3) => vec!["tc"],
        (_, n) => vec![single; n as usize],
    })
}

#[async_trait]
impl Automation for MacOsAutomation {
    async fn click(&self, at: Point, clicks: u32, button: MouseButton) -> Result<()> {
        let coords = cliclick_coords(at);
        let args = click_command(button, clicks)?
            .into_iter()
            .map(|cmd| format!("{}:{}", cmd, coords))
            .collect::<Vec<_>>();
        if args.is_empty() {
            return Ok(());
        }
        debug!("Clicking {:?} x{} at {}", button, clicks, coords);
        self.cliclick(args).await.map(|_| ())
    }

    async fn move_pointer(&self, to: Point) -> Result<()> {
        self.cliclick(vec![format!("m:{}", cliclick_coords(to))]).await.map(|_| ())
    }

    async fn drag(&self, from: Point, to: Point, duration: Duration, button: MouseButton) -> Result<()> {
        if button != MouseButton::Left {
            bail!("Only left-button drags are supported on macOS");
        }
        // -w is the pause between events; spread the duration over the two gaps
        let wait_ms = (duration.as_millis() / 2).max(20);
        let args = vec![
            "-w".to_string(),
            wait_ms.to_string(),
            format!("dd:{}", cliclick_coords(from)),
            format!("dm:{}", cliclick_coords(to)),
            format!("du:{}", cliclick_coords(to)),
        ];
        self.cliclick(args).await.map(|_| ())
    }

    async fn scroll(&self, amount: i32) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.executor
            .run_default(&templates::scroll_wheel(amount))
            .await?
            .into_output()?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.cliclick(keys::press(key)?).await.map(|_| ())
    }

    async fn hotkey(&self, combo: &[String]) -> Result<()> {
        self.cliclick(keys::chord(combo)?).await.map(|_| ())
    }

    async fn type_text(&self, text: &str) -> Result<InputMethod> {
        if text.is_empty() {
            return Ok(InputMethod::Keystroke);
        }
        match self.clipboard.set_text(text).await {
            Ok(()) => {
                tokio::time::sleep(PASTE_SETTLE).await;
                self.cliclick(keys::chord(&["cmd".to_string(), "v".to_string()])?)
                    .await?;
                tokio::time::sleep(PASTE_SETTLE).await;
                Ok(InputMethod::Clipboard)
            }
            Err(e) => {
                warn!("Clipboard unavailable, typing instead: {}", e);
                self.cliclick(vec![format!("t:{}", text)]).await?;
                Ok(InputMethod::Keystroke)
            }
        }
    }

    async fn screenshot(&self, quality: u8) -> Result<Screenshot> {
        let quality = quality.clamp(1, 100);
        let image = self.capture_to_temp().await?;
        self.run_tool(
            "sips",
            vec![
                "-s".to_string(),
                "formatOptions".to_string(),
                quality.to_string(),
                image.arg(),
                "--out".to_string(),
                image.arg(),
            ],
        )
        .await?;

        let bytes = tokio::fs::read(&image.0)
            .await
            .with_context(|| format!("Failed to read {}", image.0.display()))?;
        debug!("Captured screenshot ({} bytes, quality {})", bytes.len(), quality);

        Ok(Screenshot {
            data: STANDARD.encode(&bytes),
            mouse_position: self.pointer_position().await?,
        })
    }

    async fn screen_size(&self) -> Result<ScreenSize> {
        let bounds = self
            .executor
            .run_default(&templates::desktop_bounds())
            .await?
            .into_output()?;
        let (width, height) = parse_bounds(&bounds)?;

        let image = self.capture_to_temp().await?;
        let dims = self
            .run_tool(
                "sips",
                vec![
                    "-g".to_string(),
                    "pixelWidth".to_string(),
                    "-g".to_string(),
                    "pixelHeight".to_string(),
                    image.arg(),
                ],
            )
            .await?;
        let (physical_width, physical_height) = parse_sips_dimensions(&dims)?;

        Ok(ScreenSize {
            width,
            height,
            physical_width,
            physical_height,
            scale: physical_width as f64 / width as f64,
        })
    }

    fn set_cursor_visible(&self, visible: bool) {
        self.cursor.set_visible(visible);
    }

    fn cursor_visible(&self) -> bool {
        self.cursor.is_visible()
    }
}
