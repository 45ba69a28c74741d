//! Key names to `cliclick` commands
//!
//! Controllers send pyautogui-style names (`command`, `option`, `enter`,
//! `pageup`). `cliclick` wants its own vocabulary: `kd:`/`ku:` for modifiers,
//! `kp:` for named keys, `t:` for printable characters.

use anyhow::{Result, bail};

const MODIFIERS: &[(&[&str], &str)] = &[
    (&["cmd", "command", "meta", "super", "win"], "cmd"),
    (&["ctrl", "control"], "ctrl"),
    (&["alt", "option", "opt"], "alt"),
    (&["shift"], "shift"),
    (&["fn"], "fn"),
];

const NAMED_KEYS: &[(&[&str], &str)] = &[
    (&["enter", "return"], "return"),
    (&["esc", "escape"], "esc"),
    (&["tab"], "tab"),
    (&["space"], "space"),
    (&["delete", "backspace"], "delete"),
    (&["fwd-delete", "forwarddelete", "del"], "fwd-delete"),
    (&["up", "arrow-up", "arrowup"], "arrow-up"),
    (&["down", "arrow-down", "arrowdown"], "arrow-down"),
    (&["left", "arrow-left", "arrowleft"], "arrow-left"),
    (&["right", "arrow-right", "arrowright"], "arrow-right"),
    (&["home"], "home"),
    (&["end"], "end"),
    (&["pageup", "page_up", "page-up"], "page-up"),
    (&["pagedown", "page_down", "page-down"], "page-down"),
    (&["volumeup"], "volume-up"),
    (&["volumedown"], "volume-down"),
    (&["volumemute", "mute"], "mute"),
    (&["playpause"], "play-pause"),
];

fn lookup(table: &[(&[&str], &'static str)], name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(aliases, _)| aliases.contains(&name))
        .map(|(_, key)| *key)
}

pub fn modifier(name: &str) -> Option<&'static str> {
    lookup(MODIFIERS, &name.trim().to_lowercase())
}

/// `cliclick` command pressing a single non-modifier key
pub fn key_press(name: &str) -> Result<String> {
    if name.is_empty() {
        bail!("Key name must not be empty");
    }
    // a literal space is a key, not whitespace to trim
    if name == " " {
        return Ok("kp:space".to_string());
    }
    let lower = name.trim().to_lowercase();
    if let Some(key) = lookup(NAMED_KEYS, &lower) {
        return Ok(format!("kp:{}", key));
    }
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok())
        && (1..=16).contains(&n)
    {
        return Ok(format!("kp:f{}", n));
    }
    let mut chars = name.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Ok(format!("t:{}", c)),
        _ => bail!("Unsupported key: {}", name),
    }
}

/// Commands for a single key press. Modifiers alone are tapped down and up.
pub fn press(name: &str) -> Result<Vec<String>> {
    if let Some(m) = modifier(name) {
        return Ok(vec![format!("kd:{}", m), format!("ku:{}", m)]);
    }
    Ok(vec![key_press(name)?])
}

/// Commands for a chord such as `["command", "shift", "t"]`.
///
/// Modifiers are held in the order given and released in reverse; every
/// non-modifier key is pressed while they are held.
pub fn chord(keys: &[String]) -> Result<Vec<String>> {
    if keys.is_empty() {
        bail!("Hotkey requires at least one key");
    }

    let mut held = Vec::new();
    let mut pressed = Vec::new();
    for key in keys {
        match modifier(key) {
            Some(m) if !held.contains(&m) => held.push(m),
            Some(_) => {}
            None => pressed.push(key_press(key)?),
        }
    }

    let mut args: Vec<String> = held.iter().map(|m| format!("kd:{}", m)).collect();
    args.extend(pressed);
    args.extend(held.iter().rev().map(|m| format!("ku:{}", m)));
    Ok(args)
}
