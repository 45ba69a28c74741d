//! Script template builders
//!
//! Builders are pure: the same sanitized inputs always produce the same
//! program text. Interpolated values must be [`Sanitized`] for the program's
//! dialect; no escaping happens here.

use crate::sanitize::Sanitized;
use crate::script::{Dialect, ScriptProgram};

/// Inspector recursion depth used when the caller gives none
pub const DEFAULT_INSPECT_DEPTH: u32 = 3;
/// Recursion depth for locating a single element by role and name
pub const DEFAULT_SEARCH_DEPTH: u32 = 5;
/// Hard ceiling applied to any caller-provided depth
pub const MAX_DEPTH: u32 = 10;
pub const DEFAULT_MAX_WEB_ELEMENTS: u32 = 100;

pub fn clamp_depth(depth: u32) -> u32 {
    depth.min(MAX_DEPTH)
}

fn expect_dialect(values: &[&Sanitized], dialect: Dialect) {
    for value in values {
        debug_assert_eq!(
            value.dialect(),
            dialect,
            "value escaped for the wrong dialect"
        );
    }
}

/// `findElementRecursive(elem, role, name, depth)`: depth-first search by role and name/title.
pub fn element_finder(max_depth: u32) -> ScriptProgram {
    let max_depth = clamp_depth(max_depth);
    ScriptProgram::jxa(format!(
        r#"function findElementRecursive(elem, role, name, depth) {{
  if (depth > {max_depth}) return null;
  try {{
    const props = elem.properties();
    if (props.role === role && (props.name === name || props.title === name)) {{
      return elem;
    }}
    const children = elem.uiElements();
    for (let i = 0; i < children.length; i++) {{
      const found = findElementRecursive(children[i], role, name, depth + 1);
      if (found) return found;
    }}
  }} catch (e) {{}}
  return null;
}}"#
    ))
}

/// `inspectElement(elem, depth)`: property tree of an element, children only below `max_depth`.
pub fn element_inspector(max_depth: u32) -> ScriptProgram {
    let max_depth = clamp_depth(max_depth);
    ScriptProgram::jxa(format!(
        r#"function inspectElement(elem, depth) {{
  if (depth > {max_depth}) return null;
  try {{
    const props = elem.properties();
    const result = {{
      role: props.role,
      roleDescription: props.roleDescription || "",
      name: props.name || props.title || "",
      description: props.description || "",
      value: props.value || null,
      position: props.position ? [props.position[0], props.position[1]] : [0, 0],
      size: props.size ? [props.size[0], props.size[1]] : [0, 0],
      enabled: props.enabled !== undefined ? props.enabled : true,
      focused: props.focused || false,
      selected: props.selected || false,
      actions: [],
      subrole: props.subrole || "",
      children: []
    }};
    try {{
      result.actions = elem.actions().map(a => a.name());
    }} catch (e) {{}}
    if (depth < {max_depth}) {{
      try {{
        result.children = elem.uiElements()
          .map(child => inspectElement(child, depth + 1))
          .filter(c => c !== null);
      }} catch (e) {{}}
    }}
    return result;
  }} catch (e) {{
    return null;
  }}
}}"#
    ))
}

/// `findWebArea(root)`: first AXWebArea below `root`.
pub fn web_area_finder() -> ScriptProgram {
    ScriptProgram::jxa(
        r#"function findWebArea(root) {
  try {
    const elements = root.entireContents();
    for (let i = 0; i < elements.length; i++) {
      try {
        if (elements[i].role() === "AXWebArea") {
          return elements[i];
        }
      } catch (e) {}
    }
  } catch (e) {}
  return null;
}"#,
    )
}

/// `findElement(root, role, name)`: flat search over the contents of a web area.
pub fn web_element_finder() -> ScriptProgram {
    ScriptProgram::jxa(
        r#"function findElement(root, role, name) {
  try {
    const elements = root.entireContents();
    for (let i = 0; i < elements.length; i++) {
      const elem = elements[i];
      try {
        const props = elem.properties();
        if (props.role === role && (props.name === name || props.title === name)) {
          return elem;
        }
      } catch (e) {}
    }
  } catch (e) {}
  return null;
}"#,
    )
}

fn process_prelude(app_name: &Sanitized) -> String {
    format!(
        r#"const se = Application("System Events");
const proc = se.processes["{app_name}"];"#
    )
}

/// Locate an element and print its centre as `{"status":"success","x":..,"y":..}`.
pub fn click_element(
    app_name: &Sanitized,
    role: &Sanitized,
    name: &Sanitized,
    search_depth: u32,
) -> ScriptProgram {
    expect_dialect(&[app_name, role, name], Dialect::Jxa);
    let prelude = process_prelude(app_name);
    let finder = element_finder(search_depth);
    let finder = finder.source();
    ScriptProgram::jxa(format!(
        r#"{prelude}

{finder}

if (proc.windows.length === 0) {{
  "ERROR: No windows found";
}} else {{
  const elem = findElementRecursive(proc.windows[0], "{role}", "{name}", 0);
  if (elem !== null) {{
    const props = elem.properties();
    const pos = props.position;
    const size = props.size;
    JSON.stringify({{
      status: "success",
      x: pos[0] + size[0] / 2,
      y: pos[1] + size[1] / 2
    }});
  }} else {{
    "ERROR: Element not found";
  }}
}}
"#
    ))
}

/// Locate an element and give it keyboard focus; prints `success` or `ERROR: ...`.
pub fn focus_element(
    app_name: &Sanitized,
    role: &Sanitized,
    name: &Sanitized,
    search_depth: u32,
) -> ScriptProgram {
    expect_dialect(&[app_name, role, name], Dialect::Jxa);
    let prelude = process_prelude(app_name);
    let finder = element_finder(search_depth);
    let finder = finder.source();
    ScriptProgram::jxa(format!(
        r#"{prelude}

{finder}

if (proc.windows.length === 0) {{
  "ERROR: No windows found";
}} else {{
  const elem = findElementRecursive(proc.windows[0], "{role}", "{name}", 0);
  if (elem !== null) {{
    elem.focused = true;
    "success";
  }} else {{
    "ERROR: Element not found";
  }}
}}
"#
    ))
}

/// Property tree of every window of the process as `{"windows": [...]}`.
pub fn inspect_ui(app_name: &Sanitized, max_depth: u32) -> ScriptProgram {
    expect_dialect(&[app_name], Dialect::Jxa);
    let inspector = element_inspector(max_depth);
    let inspector = inspector.source();
    ScriptProgram::jxa(format!(
        r#"const se = Application("System Events");

{inspector}

if (!se.processes["{app_name}"].exists()) {{
  JSON.stringify({{ error: "Process not found" }});
}} else {{
  const proc = se.processes["{app_name}"];
  const windows = proc.windows();
  const result = windows.map(win => inspectElement(win, 0)).filter(w => w !== null);
  JSON.stringify({{ windows: result }});
}}
"#
    ))
}

/// Up to `max_results` elements below the first AXWebArea as `{"elements": [...]}`.
pub fn list_web_elements(app_name: &Sanitized, max_results: u32) -> ScriptProgram {
    expect_dialect(&[app_name], Dialect::Jxa);
    let prelude = process_prelude(app_name);
    let web_area = web_area_finder();
    let web_area = web_area.source();
    ScriptProgram::jxa(format!(
        r#"{prelude}

{web_area}

if (proc.windows.length === 0) {{
  JSON.stringify({{ error: "No windows found" }});
}} else {{
  const webArea = findWebArea(proc.windows[0]);
  if (webArea !== null) {{
    const webElements = webArea.entireContents();
    const result = [];
    for (let i = 0; i < Math.min(webElements.length, {max_results}); i++) {{
      try {{
        const elem = webElements[i];
        const props = elem.properties();
        result.push({{
          role: props.role,
          name: props.name || props.title || "",
          value: props.value || "",
          description: props.description || "",
          position: props.position ? [props.position[0], props.position[1]] : [0, 0],
          size: props.size ? [props.size[0], props.size[1]] : [0, 0]
        }});
      }} catch (e) {{}}
    }}
    JSON.stringify({{ elements: result }});
  }} else {{
    JSON.stringify({{ error: "AXWebArea not found" }});
  }}
}}
"#
    ))
}

/// Locate an element inside the web area and print its centre.
pub fn click_web_element(app_name: &Sanitized, role: &Sanitized, name: &Sanitized) -> ScriptProgram {
    expect_dialect(&[app_name, role, name], Dialect::Jxa);
    let prelude = process_prelude(app_name);
    let web_area = web_area_finder();
    let web_area = web_area.source();
    let finder = web_element_finder();
    let finder = finder.source();
    ScriptProgram::jxa(format!(
        r#"{prelude}

{web_area}

{finder}

if (proc.windows.length === 0) {{
  "ERROR: No windows found";
}} else {{
  const webArea = findWebArea(proc.windows[0]);
  if (webArea !== null) {{
    const elem = findElement(webArea, "{role}", "{name}");
    if (elem !== null) {{
      const props = elem.properties();
      const pos = props.position;
      const size = props.size;
      JSON.stringify({{
        status: "success",
        x: pos[0] + size[0] / 2,
        y: pos[1] + size[1] / 2
      }});
    }} else {{
      "ERROR: Element not found";
    }}
  }} else {{
    "ERROR: AXWebArea not found";
  }}
}}
"#
    ))
}

/// Three levels of `role|name|x,y|w,h` records for each window, as an AppleScript list.
pub fn list_ui_elements(app_name: &Sanitized) -> ScriptProgram {
    expect_dialect(&[app_name], Dialect::AppleScript);
    ScriptProgram::applescript(format!(
        r#"tell application "System Events"
    if not (exists application process "{app_name}") then return "ERROR: Process not found"
    tell application process "{app_name}"
        set elements_data to {{}}
        repeat with win in windows
            try
                set {{r, n, p, s}} to {{role, name, position, size}} of win
                if n is missing value then set n to ""
                set end of elements_data to r & "|" & n & "|" & (item 1 of p) & "," & (item 2 of p) & "|" & (item 1 of s) & "," & (item 2 of s)
                set children to UI elements of win
                set {{rs, ns, ps, ss}} to {{role, name, position, size}} of UI elements of win
                repeat with i from 1 to count of rs
                    set n_val to item i of ns
                    if n_val is missing value then set n_val to ""
                    set end of elements_data to (item i of rs) & "|" & n_val & "|" & (item 1 of item i of ps) & "," & (item 2 of item i of ps) & "|" & (item 1 of item i of ss) & "," & (item 2 of item i of ss)
                    try
                        set subchildren to UI elements of (item i of children)
                        if (count of subchildren) > 0 then
                            set {{rrs, nns, pps, sss}} to {{role, name, position, size}} of subchildren
                            repeat with j from 1 to count of rrs
                                set nn to item j of nns
                                if nn is missing value then set nn to ""
                                set end of elements_data to (item j of rrs) & "|" & nn & "|" & (item 1 of item j of pps) & "," & (item 2 of item j of pps) & "|" & (item 1 of item j of sss) & "," & (item 2 of item j of sss)
                            end repeat
                        end if
                    end try
                end repeat
            end try
        end repeat
        return elements_data
    end tell
end tell
"#
    ))
}

/// Resolve a bundle identifier to an application name through Finder.
pub fn app_name_for_bundle_id(bundle_id: &Sanitized) -> ScriptProgram {
    expect_dialect(&[bundle_id], Dialect::AppleScript);
    ScriptProgram::applescript(format!(
        r#"tell application "Finder" to get name of (application file id "{bundle_id}")"#
    ))
}

/// Post a vertical scroll-wheel event through CoreGraphics.
pub fn scroll_wheel(amount: i32) -> ScriptProgram {
    ScriptProgram::jxa(format!(
        r#"ObjC.import("CoreGraphics");
const event = $.CGEventCreateScrollWheelEvent2(null, 1, 1, {amount}, 0, 0);
$.CGEventPost(0, event);
"success";
"#
    ))
}

/// Logical desktop bounds as `x1, y1, x2, y2`.
pub fn desktop_bounds() -> ScriptProgram {
    ScriptProgram::applescript(r#"tell application "Finder" to get bounds of window of desktop"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard;
    use crate::sanitize::{Policy, sanitize};

    fn jxa(value: &str, policy: Policy) -> Sanitized {
        sanitize(value, policy, Dialect::Jxa).unwrap()
    }

    #[test]
    fn test_builders_are_deterministic() {
        let app = jxa("Safari", Policy::AppName);
        let role = jxa("AXButton", Policy::UiIdentifier);
        let name = jxa("OK", Policy::UiIdentifier);
        assert_eq!(
            click_element(&app, &role, &name, 5).source(),
            click_element(&app, &role, &name, 5).source()
        );
        assert_eq!(inspect_ui(&app, 3), inspect_ui(&app, 3));
    }

    #[test]
    fn test_click_element_interpolation() {
        let app = jxa("Google Chrome", Policy::AppName);
        let role = jxa("AXButton", Policy::UiIdentifier);
        let name = jxa("Reload\\page", Policy::UiIdentifier);
        let program = click_element(&app, &role, &name, 5);
        assert_eq!(program.dialect(), Dialect::Jxa);
        let src = program.source();
        assert!(src.contains(r#"se.processes["Google Chrome"]"#));
        assert!(src.contains(r#"findElementRecursive(proc.windows[0], "AXButton", "Reload\\page", 0)"#));
        assert!(src.contains("if (depth > 5) return null;"));
        assert!(src.contains("x: pos[0] + size[0] / 2"));
    }

    #[test]
    fn test_focus_element_sets_focus() {
        let app = jxa("TextEdit", Policy::AppName);
        let role = jxa("AXTextArea", Policy::UiIdentifier);
        let name = jxa("", Policy::UiIdentifier);
        let src = focus_element(&app, &role, &name, 5);
        assert!(src.source().contains("elem.focused = true;"));
        assert!(src.source().contains(r#""AXTextArea", "", 0)"#));
    }

    #[test]
    fn test_depth_bounds() {
        let finder = element_finder(4);
        assert!(finder.source().contains("if (depth > 4) return null;"));

        let inspector = element_inspector(2);
        assert!(inspector.source().contains("if (depth > 2) return null;"));
        assert!(inspector.source().contains("if (depth < 2) {"));

        let clamped = element_finder(1000);
        assert!(clamped.source().contains(&format!("if (depth > {}) return null;", MAX_DEPTH)));
    }

    #[test]
    fn test_inspect_ui_checks_process() {
        let app = jxa("Finder", Policy::AppName);
        let src = inspect_ui(&app, DEFAULT_INSPECT_DEPTH);
        assert!(src.source().contains(r#"if (!se.processes["Finder"].exists())"#));
        assert!(src.source().contains("function inspectElement(elem, depth)"));
        assert!(src.source().contains("JSON.stringify({ windows: result });"));
    }

    #[test]
    fn test_web_templates() {
        let app = jxa("Safari", Policy::AppName);
        let listing = list_web_elements(&app, 25);
        assert!(listing.source().contains("function findWebArea(root)"));
        assert!(listing.source().contains("Math.min(webElements.length, 25)"));

        let role = jxa("AXLink", Policy::UiIdentifier);
        let name = jxa("Sign in", Policy::UiIdentifier);
        let click = click_web_element(&app, &role, &name);
        assert!(click.source().contains("function findElement(root, role, name)"));
        assert!(click.source().contains(r#"findElement(webArea, "AXLink", "Sign in")"#));
        assert!(click.source().contains(r#""ERROR: AXWebArea not found";"#));
    }

    #[test]
    fn test_applescript_templates() {
        let app = sanitize("Notes", Policy::AppName, Dialect::AppleScript).unwrap();
        let listing = list_ui_elements(&app);
        assert_eq!(listing.dialect(), Dialect::AppleScript);
        assert!(listing.source().contains(r#"tell application process "Notes""#));
        assert!(listing.source().contains("set elements_data to {}"));

        let bundle = sanitize("com.google.Chrome", Policy::AppName, Dialect::AppleScript).unwrap();
        assert_eq!(
            app_name_for_bundle_id(&bundle).source(),
            r#"tell application "Finder" to get name of (application file id "com.google.Chrome")"#
        );
    }

    #[test]
    fn test_generated_programs_pass_shell_guard() {
        let app = jxa("Safari", Policy::AppName);
        let role = jxa("AXButton", Policy::UiIdentifier);
        let name = jxa("OK", Policy::UiIdentifier);
        let programs = [
            click_element(&app, &role, &name, 5),
            focus_element(&app, &role, &name, 5),
            inspect_ui(&app, 3),
            list_web_elements(&app, 100),
            click_web_element(&app, &role, &name),
            scroll_wheel(-3),
            desktop_bounds(),
        ];
        for program in programs {
            assert_eq!(guard::check_no_shell(program.source()), Ok(()));
        }
    }
}
