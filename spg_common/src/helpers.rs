use std::env;

/// Interprets common spellings of on/off switches. Anything unrecognised yields `None`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads an on/off switch from the environment, falling back to `default` when the variable is unset or unparseable.
pub fn env_flag(name: &str, default: bool) -> bool {
    env::var(name).ok().as_deref().and_then(parse_flag).unwrap_or(default)
}
