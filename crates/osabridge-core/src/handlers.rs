//! Action handlers
//!
//! Each handler validates and escapes its string parameters, builds a
//! program from the templates, runs it through the executor and shapes the
//! result. Pointer and keyboard work goes through the [`Automation`]
//! collaborator.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::actions::{
    ActionError, AppParams, ClickParams, DragParams, ElementParams, InspectParams, OsaParams,
    Request, ScreenshotParams, TypeToElementParams,
};
use crate::browser;
use crate::executor::ScriptExecutor;
use crate::guard;
use crate::platform::{Automation, MouseButton, Point};
use crate::protocol::Response;
use crate::sanitize::{Policy, Sanitized, sanitize};
use crate::script::{Dialect, ScriptProgram};
use crate::templates;

pub const DEFAULT_SCREENSHOT_QUALITY: u8 = 85;

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub default_depth: u32,
    pub search_depth: u32,
    pub max_web_elements: u32,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            default_depth: templates::DEFAULT_INSPECT_DEPTH,
            search_depth: templates::DEFAULT_SEARCH_DEPTH,
            max_web_elements: templates::DEFAULT_MAX_WEB_ELEMENTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub inspector: InspectorConfig,
    pub screenshot_quality: u8,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            inspector: InspectorConfig::default(),
            screenshot_quality: DEFAULT_SCREENSHOT_QUALITY,
        }
    }
}

/// Centre point printed by the locate-and-click programs
#[derive(Debug, Deserialize)]
struct Located {
    status: String,
    x: f64,
    y: f64,
}

/// Interpret a locate program's stdout: JSON coordinates or an `ERROR: ...` line
fn parse_located(output: &str) -> Result<Point, ActionError> {
    if output.starts_with('{')
        && let Ok(located) = serde_json::from_str::<Located>(output)
        && located.status == "success"
    {
        return Ok(Point::new(located.x, located.y));
    }
    Err(ActionError::Script(script_message(output)))
}

fn script_message(output: &str) -> String {
    if output.is_empty() {
        "Script produced no output".to_string()
    } else {
        output.to_string()
    }
}

/// Decode JSON printed by an inspection program; `{"error": ...}` becomes a failure.
fn parse_ui_data(output: &str) -> Result<Value, ActionError> {
    let data: Value = serde_json::from_str(output)
        .map_err(|e| ActionError::Script(format!("Invalid UI data from script: {}", e)))?;
    if let Some(message) = data.get("error").and_then(Value::as_str) {
        return Err(ActionError::Script(message.to_string()));
    }
    Ok(data)
}

/// Split AppleScript list output (`a, b, c`) into records.
pub fn split_element_records(output: &str) -> Result<Vec<String>, ActionError> {
    if output.starts_with("ERROR") {
        return Err(ActionError::Script(output.to_string()));
    }
    if output.is_empty() {
        return Ok(Vec::new());
    }
    Ok(output.split(", ").map(str::to_string).collect())
}

struct ElementTarget {
    app_name: Sanitized,
    role: Sanitized,
    name: Sanitized,
}

impl ElementTarget {
    fn jxa(app_name: &str, role: &str, name: &str) -> Result<Self, ActionError> {
        Ok(Self {
            app_name: sanitize(app_name, Policy::AppName, Dialect::Jxa)?,
            role: sanitize(role, Policy::UiIdentifier, Dialect::Jxa)?,
            name: sanitize(name, Policy::UiIdentifier, Dialect::Jxa)?,
        })
    }
}

fn point_json(p: Point) -> Value {
    json!({ "x": p.x, "y": p.y })
}

#[derive(Clone)]
pub struct Handlers {
    executor: Arc<ScriptExecutor>,
    automation: Arc<dyn Automation>,
    config: HandlerConfig,
}

impl Handlers {
    pub fn new(executor: Arc<ScriptExecutor>, automation: Arc<dyn Automation>, config: HandlerConfig) -> Self {
        Self {
            executor,
            automation,
            config,
        }
    }

    pub async fn handle(&self, request: Request) -> Result<Response, ActionError> {
        match request {
            Request::Screenshot(p) => self.screenshot(p).await,
            Request::Size => self.size().await,
            Request::Click(p) => self.click(p).await,
            Request::Type(p) => self.type_text(&p.text).await,
            Request::Press(p) => {
                self.automation.press_key(&p.key).await?;
                Ok(Response::success())
            }
            Request::Hotkey(p) => {
                self.automation.hotkey(&p.keys).await?;
                Ok(Response::success())
            }
            Request::Move(p) => {
                self.automation.move_pointer(Point::new(p.x, p.y)).await?;
                Ok(Response::success())
            }
            Request::Scroll(p) => {
                self.automation.scroll(p.amount).await?;
                Ok(Response::success())
            }
            Request::Drag(p) => self.drag(p).await,
            Request::SetCursorVisibility(p) => {
                self.automation.set_cursor_visible(p.visible);
                info!("Cursor visibility set to {}", p.visible);
                Ok(Response::success().field("visible", p.visible))
            }
            Request::Osa(p) => self.osa(p).await,
            Request::Elements(p) => self.elements(p).await,
            Request::ElementsJson(p) => self.elements_json(p).await,
            Request::ClickElement(p) => self.click_element(p).await,
            Request::FocusElement(p) => {
                self.focus_element(&p.app_name, &p.role, &p.name).await?;
                Ok(Response::success())
            }
            Request::TypeToElement(p) => self.type_to_element(p).await,
            Request::WebElements(p) => self.web_elements(p).await,
            Request::ClickWebElement(p) => self.click_web_element(p).await,
            Request::Browser => {
                let found = browser::default_browser(&self.executor).await;
                Ok(Response::success()
                    .field("browser", found.name)
                    .field("bundle_id", found.bundle_id))
            }
            // the dispatcher ends the loop before exit reaches a handler
            Request::Exit => Ok(Response::success()),
        }
    }

    async fn screenshot(&self, params: ScreenshotParams) -> Result<Response, ActionError> {
        if params.highlight_pos.is_some() {
            debug!("highlight_pos ignored: markers are not drawn");
        }
        let quality = params.quality.unwrap_or(self.config.screenshot_quality);
        let shot = self.automation.screenshot(quality).await?;
        Ok(Response::success()
            .field("data", shot.data)
            .field("mouse_position", point_json(shot.mouse_position)))
    }

    async fn size(&self) -> Result<Response, ActionError> {
        let size = self.automation.screen_size().await?;
        Ok(Response::success()
            .field("width", size.width)
            .field("height", size.height)
            .field("physical_width", size.physical_width)
            .field("physical_height", size.physical_height)
            .field("scale", size.scale))
    }

    async fn click(&self, params: ClickParams) -> Result<Response, ActionError> {
        self.automation
            .click(Point::new(params.x, params.y), params.clicks, params.button)
            .await?;
        Ok(Response::success())
    }

    async fn type_text(&self, text: &str) -> Result<Response, ActionError> {
        let method = self.automation.type_text(text).await?;
        Ok(Response::success().field("method", method.as_str()))
    }

    async fn drag(&self, params: DragParams) -> Result<Response, ActionError> {
        self.automation
            .drag(
                Point::new(params.from_x, params.from_y),
                Point::new(params.to_x, params.to_y),
                Duration::from_secs_f64(params.duration),
                params.button,
            )
            .await?;
        Ok(Response::success())
    }

    async fn osa(&self, params: OsaParams) -> Result<Response, ActionError> {
        guard::check_script(&params.script)?;
        let timeout = params
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.executor.config().default_timeout);
        let program = ScriptProgram::applescript(params.script);
        let output = self.executor.run(&program, timeout).await?.into_output()?;
        Ok(Response::success().field("output", output))
    }

    async fn elements(&self, params: AppParams) -> Result<Response, ActionError> {
        let app_name = sanitize(&params.app_name, Policy::AppName, Dialect::AppleScript)?;
        let output = self
            .executor
            .run_default(&templates::list_ui_elements(&app_name))
            .await?
            .into_output()?;
        Ok(Response::success().field("elements", split_element_records(&output)?))
    }

    async fn elements_json(&self, params: InspectParams) -> Result<Response, ActionError> {
        let app_name = sanitize(&params.app_name, Policy::AppName, Dialect::Jxa)?;
        let depth = templates::clamp_depth(params.max_depth.unwrap_or(self.config.inspector.default_depth));
        let output = self
            .executor
            .run_default(&templates::inspect_ui(&app_name, depth))
            .await?
            .into_output()?;
        Ok(Response::success().field("ui_data", parse_ui_data(&output)?))
    }

    async fn locate(&self, app_name: &str, role: &str, name: &str) -> Result<Point, ActionError> {
        let target = ElementTarget::jxa(app_name, role, name)?;
        let program = templates::click_element(
            &target.app_name,
            &target.role,
            &target.name,
            self.config.inspector.search_depth,
        );
        let output = self.executor.run_element(&program).await?.into_output()?;
        parse_located(&output)
    }

    async fn click_element(&self, params: ElementParams) -> Result<Response, ActionError> {
        let centre = self.locate(&params.app_name, &params.role, &params.name).await?;
        self.automation.click(centre, 1, MouseButton::Left).await?;
        Ok(Response::success().field("x", centre.x).field("y", centre.y))
    }

    async fn focus_element(&self, app_name: &str, role: &str, name: &str) -> Result<(), ActionError> {
        let target = ElementTarget::jxa(app_name, role, name)?;
        let program = templates::focus_element(
            &target.app_name,
            &target.role,
            &target.name,
            self.config.inspector.search_depth,
        );
        let output = self.executor.run_element(&program).await?.into_output()?;
        if output == "success" {
            Ok(())
        } else {
            Err(ActionError::Script(script_message(&output)))
        }
    }

    async fn type_to_element(&self, params: TypeToElementParams) -> Result<Response, ActionError> {
        self.focus_element(&params.app_name, &params.role, &params.name).await?;
        self.type_text(&params.text).await
    }

    async fn web_elements(&self, params: AppParams) -> Result<Response, ActionError> {
        let app_name = sanitize(&params.app_name, Policy::AppName, Dialect::Jxa)?;
        let program = templates::list_web_elements(&app_name, self.config.inspector.max_web_elements);
        let output = self.executor.run_default(&program).await?.into_output()?;
        Ok(Response::success().field("ui_data", parse_ui_data(&output)?))
    }

    async fn click_web_element(&self, params: ElementParams) -> Result<Response, ActionError> {
        let target = ElementTarget::jxa(&params.app_name, &params.role, &params.name)?;
        let program = templates::click_web_element(&target.app_name, &target.role, &target.name);
        let output = self.executor.run_element(&program).await?.into_output()?;
        let centre = parse_located(&output)?;
        self.automation.click(centre, 1, MouseButton::Left).await?;
        Ok(Response::success().field("x", centre.x).field("y", centre.y))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::executor::ExecutorConfig;
    use crate::executor::tests::FakeRunner;
    use crate::platform::{CursorState, InputMethod, ScreenSize, Screenshot};
    use crate::protocol::ErrorType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every call; `panic_on` makes the named primitive panic
    #[derive(Default)]
    pub(crate) struct MockAutomation {
        pub calls: Mutex<Vec<String>>,
        pub cursor: CursorState,
        pub panic_on: Option<&'static str>,
    }

    impl MockAutomation {
        fn record(&self, call: String) {
            if let Some(name) = self.panic_on
                && call.starts_with(name)
            {
                panic!("mock automation failure in {}", name);
            }
            self.calls.lock().unwrap().push(call);
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Automation for MockAutomation {
        async fn click(&self, at: Point, clicks: u32, button: MouseButton) -> anyhow::Result<()> {
            self.record(format!("click {},{} x{} {:?}", at.x, at.y, clicks, button));
            Ok(())
        }

        async fn move_pointer(&self, to: Point) -> anyhow::Result<()> {
            self.record(format!("move {},{}", to.x, to.y));
            Ok(())
        }

        async fn drag(&self, from: Point, to: Point, duration: Duration, _button: MouseButton) -> anyhow::Result<()> {
            self.record(format!("drag {},{} -> {},{} {:?}", from.x, from.y, to.x, to.y, duration));
            Ok(())
        }

        async fn scroll(&self, amount: i32) -> anyhow::Result<()> {
            self.record(format!("scroll {}", amount));
            Ok(())
        }

        async fn press_key(&self, key: &str) -> anyhow::Result<()> {
            self.record(format!("press {}", key));
            Ok(())
        }

        async fn hotkey(&self, keys: &[String]) -> anyhow::Result<()> {
            self.record(format!("hotkey {}", keys.join("+")));
            Ok(())
        }

        async fn type_text(&self, text: &str) -> anyhow::Result<InputMethod> {
            self.record(format!("type {}", text));
            Ok(InputMethod::Clipboard)
        }

        async fn screenshot(&self, quality: u8) -> anyhow::Result<Screenshot> {
            self.record(format!("screenshot {}", quality));
            Ok(Screenshot {
                data: "aGVsbG8=".to_string(),
                mouse_position: Point::new(5.0, 6.0),
            })
        }

        async fn screen_size(&self) -> anyhow::Result<ScreenSize> {
            self.record("size".to_string());
            Ok(ScreenSize {
                width: 1512,
                height: 982,
                physical_width: 3024,
                physical_height: 1964,
                scale: 2.0,
            })
        }

        fn set_cursor_visible(&self, visible: bool) {
            self.cursor.set_visible(visible);
        }

        fn cursor_visible(&self) -> bool {
            self.cursor.is_visible()
        }
    }

    fn handlers(runner: Arc<FakeRunner>, automation: Arc<MockAutomation>) -> Handlers {
        let executor = Arc::new(ScriptExecutor::with_runner(ExecutorConfig::default(), runner));
        Handlers::new(executor, automation, HandlerConfig::default())
    }

    fn request(action: Action, params: Value) -> Request {
        Request::parse(action, params).unwrap()
    }

    #[test]
    fn test_parse_located() {
        let p = parse_located(r#"{"status":"success","x":110.5,"y":42}"#).unwrap();
        assert_eq!(p, Point::new(110.5, 42.0));

        let err = parse_located("ERROR: Element not found").unwrap_err();
        assert_eq!(err.to_string(), "ERROR: Element not found");
        assert_eq!(err.error_type(), ErrorType::Execution);
    }

    #[test]
    fn test_split_element_records() {
        assert!(split_element_records("").unwrap().is_empty());
        assert_eq!(
            split_element_records("AXWindow|Doc|0,0|800,600, AXButton|OK|10,10|80,20").unwrap(),
            vec!["AXWindow|Doc|0,0|800,600", "AXButton|OK|10,10|80,20"]
        );
        assert!(split_element_records("ERROR: Process not found").is_err());
    }

    #[test]
    fn test_parse_ui_data_error_field() {
        let err = parse_ui_data(r#"{"error":"Process not found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Process not found");
        assert!(parse_ui_data("not json").is_err());
        assert_eq!(parse_ui_data(r#"{"windows":[]}"#).unwrap(), json!({"windows": []}));
    }

    #[tokio::test]
    async fn test_click_element_clicks_centre() {
        let runner = Arc::new(FakeRunner::ok(r#"{"status":"success","x":50,"y":60}"#));
        let automation = Arc::new(MockAutomation::default());
        let h = handlers(runner.clone(), automation.clone());

        let resp = h
            .handle(request(
                Action::ClickElement,
                json!({"app_name": "Safari", "role": "AXButton", "name": "Reload"}),
            ))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.get("x"), Some(&json!(50.0)));
        assert_eq!(automation.calls(), vec!["click 50,60 x1 Left"]);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].2, Duration::from_secs(5));
        assert!(calls[0].1.last().unwrap().contains(r#""AXButton", "Reload""#));
    }

    #[tokio::test]
    async fn test_injection_in_role_never_runs() {
        let runner = Arc::new(FakeRunner::ok("success"));
        let automation = Arc::new(MockAutomation::default());
        let h = handlers(runner.clone(), automation);

        let err = h
            .handle(request(
                Action::FocusElement,
                json!({"app_name": "Safari", "role": "AXButton\"); eval(\"x", "name": "OK"}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Policy);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_osa_guard_blocks_before_spawn() {
        let runner = Arc::new(FakeRunner::ok("nope"));
        let h = handlers(runner.clone(), Arc::new(MockAutomation::default()));
        let err = h
            .handle(request(Action::Osa, json!({"script": "do shell script \"rm -rf ~\""})))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Policy);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_osa_output_and_timeout() {
        let runner = Arc::new(FakeRunner::ok("3\n"));
        let h = handlers(runner.clone(), Arc::new(MockAutomation::default()));
        let resp = h
            .handle(request(Action::Osa, json!({"script": "return 1 + 2", "timeout_secs": 20})))
            .await
            .unwrap();
        assert_eq!(resp.get("output"), Some(&json!("3")));
        assert_eq!(runner.calls.lock().unwrap()[0].2, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_osa_failure_is_execution_error() {
        let runner = Arc::new(FakeRunner::failing("execution error: nope (-1728)"));
        let h = handlers(runner, Arc::new(MockAutomation::default()));
        let err = h
            .handle(request(Action::Osa, json!({"script": "tell application \"Nope\" to quit"})))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Execution);
        assert!(err.to_string().contains("-1728"));
    }

    #[tokio::test]
    async fn test_element_timeout_maps_to_timeout() {
        let runner = Arc::new(FakeRunner::timing_out());
        let h = handlers(runner, Arc::new(MockAutomation::default()));
        let err = h
            .handle(request(
                Action::FocusElement,
                json!({"app_name": "Safari", "role": "AXTextField", "name": "Address"}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Timeout);
    }

    #[tokio::test]
    async fn test_type_to_element_focuses_then_types() {
        let runner = Arc::new(FakeRunner::ok("success"));
        let automation = Arc::new(MockAutomation::default());
        let h = handlers(runner, automation.clone());
        let resp = h
            .handle(request(
                Action::TypeToElement,
                json!({"app_name": "TextEdit", "role": "AXTextArea", "name": "", "text": "こんにちは"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.get("method"), Some(&json!("clipboard")));
        assert_eq!(automation.calls(), vec!["type こんにちは"]);
    }

    #[tokio::test]
    async fn test_type_to_element_stops_when_focus_fails() {
        let runner = Arc::new(FakeRunner::ok("ERROR: Element not found"));
        let automation = Arc::new(MockAutomation::default());
        let h = handlers(runner, automation.clone());
        let err = h
            .handle(request(
                Action::TypeToElement,
                json!({"app_name": "TextEdit", "role": "AXTextArea", "name": "Body", "text": "x"}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ERROR: Element not found");
        assert!(automation.calls().is_empty());
    }

    #[tokio::test]
    async fn test_elements_json_depth_is_clamped() {
        let runner = Arc::new(FakeRunner::ok(r#"{"windows":[]}"#));
        let h = handlers(runner.clone(), Arc::new(MockAutomation::default()));
        let resp = h
            .handle(request(Action::ElementsJson, json!({"app_name": "Finder", "max_depth": 99})))
            .await
            .unwrap();
        assert_eq!(resp.get("ui_data"), Some(&json!({"windows": []})));
        let calls = runner.calls.lock().unwrap();
        assert!(calls[0].1.last().unwrap().contains("depth > 10"));
    }

    #[tokio::test]
    async fn test_screenshot_and_cursor_visibility() {
        let automation = Arc::new(MockAutomation::default());
        let h = handlers(Arc::new(FakeRunner::ok("")), automation.clone());

        let resp = h
            .handle(request(Action::SetCursorVisibility, json!({"visible": false})))
            .await
            .unwrap();
        assert_eq!(resp.get("visible"), Some(&json!(false)));
        assert!(!automation.cursor_visible());

        let resp = h.handle(request(Action::Screenshot, Value::Null)).await.unwrap();
        assert_eq!(resp.get("data"), Some(&json!("aGVsbG8=")));
        assert_eq!(resp.get("mouse_position"), Some(&json!({"x": 5.0, "y": 6.0})));
        assert_eq!(automation.calls(), vec!["screenshot 85"]);
    }

    #[tokio::test]
    async fn test_size_fields() {
        let h = handlers(Arc::new(FakeRunner::ok("")), Arc::new(MockAutomation::default()));
        let resp = h.handle(Request::Size).await.unwrap();
        assert_eq!(resp.get("physical_width"), Some(&json!(3024)));
        assert_eq!(resp.get("scale"), Some(&json!(2.0)));
    }
}
