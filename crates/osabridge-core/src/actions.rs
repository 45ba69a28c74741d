//! Action catalogue and typed parameters

use std::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::executor::ExecError;
use crate::guard::GuardError;
use crate::platform::{MAX_CLICKS, MouseButton};
use crate::protocol::ErrorType;
use crate::sanitize::SanitizeError;

/// Every action the bridge understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Screenshot,
    Size,
    Click,
    Type,
    Press,
    Hotkey,
    Move,
    Scroll,
    Drag,
    SetCursorVisibility,
    Osa,
    Elements,
    ElementsJson,
    ClickElement,
    FocusElement,
    TypeToElement,
    WebElements,
    ClickWebElement,
    Browser,
    Exit,
}

impl Action {
    pub const ALL: [Action; 20] = [
        Action::Screenshot,
        Action::Size,
        Action::Click,
        Action::Type,
        Action::Press,
        Action::Hotkey,
        Action::Move,
        Action::Scroll,
        Action::Drag,
        Action::SetCursorVisibility,
        Action::Osa,
        Action::Elements,
        Action::ElementsJson,
        Action::ClickElement,
        Action::FocusElement,
        Action::TypeToElement,
        Action::WebElements,
        Action::ClickWebElement,
        Action::Browser,
        Action::Exit,
    ];

    /// Wire name, case-sensitive
    pub fn name(self) -> &'static str {
        match self {
            Action::Screenshot => "screenshot",
            Action::Size => "size",
            Action::Click => "click",
            Action::Type => "type",
            Action::Press => "press",
            Action::Hotkey => "hotkey",
            Action::Move => "move",
            Action::Scroll => "scroll",
            Action::Drag => "drag",
            Action::SetCursorVisibility => "setCursorVisibility",
            Action::Osa => "osa",
            Action::Elements => "elements",
            Action::ElementsJson => "elementsJson",
            Action::ClickElement => "clickElement",
            Action::FocusElement => "focusElement",
            Action::TypeToElement => "typeToElement",
            Action::WebElements => "webElements",
            Action::ClickWebElement => "clickWebElement",
            Action::Browser => "browser",
            Action::Exit => "exit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.name() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Rejected input: {0}")]
    Sanitize(#[from] SanitizeError),

    #[error("{0}")]
    Guard(#[from] GuardError),

    #[error("{0}")]
    Exec(#[from] ExecError),

    /// Script ran but reported a failure on stdout
    #[error("{0}")]
    Script(String),

    #[error("{0:#}")]
    Platform(#[from] anyhow::Error),
}

impl ActionError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ActionError::InvalidParams(_) => ErrorType::Validation,
            ActionError::Sanitize(_) | ActionError::Guard(_) => ErrorType::Policy,
            ActionError::Exec(e) => match e {
                ExecError::Blocked(_) => ErrorType::Policy,
                ExecError::Spawn { .. } => ErrorType::Spawn,
                ExecError::Timeout(_) => ErrorType::Timeout,
                ExecError::Failed(_) => ErrorType::Execution,
            },
            ActionError::Script(_) => ErrorType::Execution,
            ActionError::Platform(_) => ErrorType::Platform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenshotParams {
    pub quality: Option<u8>,
    /// Accepted for controller compatibility; markers are not drawn
    pub highlight_pos: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickParams {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_clicks")]
    pub clicks: u32,
    #[serde(default)]
    pub button: MouseButton,
}

fn default_clicks() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeParams {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressParams {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HotkeyParams {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveParams {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrollParams {
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DragParams {
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    /// Seconds
    #[serde(default = "default_drag_duration")]
    pub duration: f64,
    #[serde(default)]
    pub button: MouseButton,
}

fn default_drag_duration() -> f64 {
    0.5
}

/// Longest drag a caller may request, in seconds
pub const MAX_DRAG_SECS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorVisibilityParams {
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsaParams {
    pub script: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppParams {
    pub app_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectParams {
    pub app_name: String,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementParams {
    pub app_name: String,
    pub role: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeToElementParams {
    pub app_name: String,
    pub role: String,
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

/// An action with its parameters decoded
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Screenshot(ScreenshotParams),
    Size,
    Click(ClickParams),
    Type(TypeParams),
    Press(PressParams),
    Hotkey(HotkeyParams),
    Move(MoveParams),
    Scroll(ScrollParams),
    Drag(DragParams),
    SetCursorVisibility(CursorVisibilityParams),
    Osa(OsaParams),
    Elements(AppParams),
    ElementsJson(InspectParams),
    ClickElement(ElementParams),
    FocusElement(ElementParams),
    TypeToElement(TypeToElementParams),
    WebElements(AppParams),
    ClickWebElement(ElementParams),
    Browser,
    Exit,
}

fn decode<T: DeserializeOwned>(params: Value) -> Result<T, ActionError> {
    serde_json::from_value(params).map_err(|e| ActionError::InvalidParams(e.to_string()))
}

impl Request {
    /// Decode `params` for `action`. Missing or null params mean "no parameters".
    pub fn parse(action: Action, params: Value) -> Result<Self, ActionError> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(ActionError::InvalidParams(format!(
                    "params must be an object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let request = match action {
            Action::Screenshot => Request::Screenshot(decode(params)?),
            Action::Size => decode::<NoParams>(params).map(|_| Request::Size)?,
            Action::Click => Request::Click(decode(params)?),
            Action::Type => Request::Type(decode(params)?),
            Action::Press => Request::Press(decode(params)?),
            Action::Hotkey => Request::Hotkey(decode(params)?),
            Action::Move => Request::Move(decode(params)?),
            Action::Scroll => Request::Scroll(decode(params)?),
            Action::Drag => Request::Drag(decode(params)?),
            Action::SetCursorVisibility => Request::SetCursorVisibility(decode(params)?),
            Action::Osa => Request::Osa(decode(params)?),
            Action::Elements => Request::Elements(decode(params)?),
            Action::ElementsJson => Request::ElementsJson(decode(params)?),
            Action::ClickElement => Request::ClickElement(decode(params)?),
            Action::FocusElement => Request::FocusElement(decode(params)?),
            Action::TypeToElement => Request::TypeToElement(decode(params)?),
            Action::WebElements => Request::WebElements(decode(params)?),
            Action::ClickWebElement => Request::ClickWebElement(decode(params)?),
            Action::Browser => decode::<NoParams>(params).map(|_| Request::Browser)?,
            Action::Exit => Request::Exit,
        };
        request.check()?;
        Ok(request)
    }

    /// Range checks serde cannot express
    fn check(&self) -> Result<(), ActionError> {
        let invalid = |msg: &str| Err(ActionError::InvalidParams(msg.to_string()));
        match self {
            Request::Screenshot(p) if matches!(p.quality, Some(q) if !(1..=100).contains(&q)) => {
                invalid("quality must be between 1 and 100")
            }
            Request::Click(p) if !(p.x.is_finite() && p.y.is_finite()) => invalid("coordinates must be finite"),
            Request::Click(p) if !(1..=MAX_CLICKS).contains(&p.clicks) => invalid("clicks must be between 1 and 3"),
            Request::Move(p) if !(p.x.is_finite() && p.y.is_finite()) => invalid("coordinates must be finite"),
            Request::Drag(p) if ![p.from_x, p.from_y, p.to_x, p.to_y].iter().all(|v| v.is_finite()) => {
                invalid("coordinates must be finite")
            }
            Request::Drag(p) if !(0.0..=MAX_DRAG_SECS).contains(&p.duration) => {
                invalid("duration must be between 0 and 10 seconds")
            }
            Request::Hotkey(p) if p.keys.is_empty() => invalid("keys must not be empty"),
            Request::Osa(p) if p.script.trim().is_empty() => invalid("script must not be empty"),
            Request::Osa(p) if p.timeout_secs == Some(0) => invalid("timeout_secs must be positive"),
            _ => Ok(()),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Request::Screenshot(_) => Action::Screenshot,
            Request::Size => Action::Size,
            Request::Click(_) => Action::Click,
            Request::Type(_) => Action::Type,
            Request::Press(_) => Action::Press,
            Request::Hotkey(_) => Action::Hotkey,
            Request::Move(_) => Action::Move,
            Request::Scroll(_) => Action::Scroll,
            Request::Drag(_) => Action::Drag,
            Request::SetCursorVisibility(_) => Action::SetCursorVisibility,
            Request::Osa(_) => Action::Osa,
            Request::Elements(_) => Action::Elements,
            Request::ElementsJson(_) => Action::ElementsJson,
            Request::ClickElement(_) => Action::ClickElement,
            Request::FocusElement(_) => Action::FocusElement,
            Request::TypeToElement(_) => Action::TypeToElement,
            Request::WebElements(_) => Action::WebElements,
            Request::ClickWebElement(_) => Action::ClickWebElement,
            Request::Browser => Action::Browser,
            Request::Exit => Action::Exit,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_name(action.name()), Some(action));
        }
        assert_eq!(Action::from_name("nonexistent"), None);
        // names are case-sensitive
        assert_eq!(Action::from_name("Click"), None);
        assert_eq!(Action::from_name("elementsjson"), None);
    }

    #[test]
    fn test_click_defaults() {
        let req = Request::parse(Action::Click, json!({"x": 10, "y": 20.5})).unwrap();
        assert_eq!(
            req,
            Request::Click(ClickParams {
                x: 10.0,
                y: 20.5,
                clicks: 1,
                button: MouseButton::Left
            })
        );
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let err = Request::parse(Action::Click, json!({"x": 10})).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(err.to_string().contains("y"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Request::parse(Action::Press, json!({"key": "a", "extra": 1})).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = Request::parse(Action::Elements, json!({"app_name": 42})).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = Request::parse(Action::Size, json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_parameterless_actions() {
        assert_eq!(Request::parse(Action::Size, Value::Null).unwrap(), Request::Size);
        assert_eq!(Request::parse(Action::Browser, json!({})).unwrap(), Request::Browser);
        assert!(Request::parse(Action::Browser, json!({"x": 1})).is_err());
    }

    #[test]
    fn test_range_checks() {
        assert!(Request::parse(Action::Screenshot, json!({"quality": 0})).is_err());
        assert!(Request::parse(Action::Screenshot, json!({"quality": 100})).is_ok());
        assert!(Request::parse(Action::Hotkey, json!({"keys": []})).is_err());
        for clicks in [0u64, 4, 100_000, u32::MAX as u64] {
            let err = Request::parse(Action::Click, json!({"x": 1, "y": 1, "clicks": clicks})).unwrap_err();
            assert_eq!(err.error_type(), ErrorType::Validation, "clicks {clicks}");
        }
        assert!(Request::parse(Action::Click, json!({"x": 1, "y": 1, "clicks": 3})).is_ok());
        assert!(Request::parse(Action::Osa, json!({"script": "   "})).is_err());
        assert!(
            Request::parse(
                Action::Drag,
                json!({"from_x": 0, "from_y": 0, "to_x": 1, "to_y": 1, "duration": 60})
            )
            .is_err()
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            ActionError::Exec(ExecError::Timeout(Duration::from_secs(5))).error_type(),
            ErrorType::Timeout
        );
        assert_eq!(
            ActionError::Exec(ExecError::Blocked(GuardError::ShellInvocation)).error_type(),
            ErrorType::Policy
        );
        assert_eq!(ActionError::Guard(GuardError::ShellInvocation).error_type(), ErrorType::Policy);
        assert_eq!(ActionError::Script("ERROR: x".into()).error_type(), ErrorType::Execution);
        assert_eq!(
            ActionError::Platform(anyhow::anyhow!("no clipboard")).error_type(),
            ErrorType::Platform
        );
    }

    #[test]
    fn test_request_action_matches() {
        let req = Request::parse(Action::TypeToElement, json!({
            "app_name": "TextEdit", "role": "AXTextArea", "name": "", "text": "hi"
        }))
        .unwrap();
        assert_eq!(req.action(), Action::TypeToElement);
    }
}
