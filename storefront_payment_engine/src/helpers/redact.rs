use serde_json::Value;

const SENSITIVE_KEY_FRAGMENTS: [&str; 8] =
    ["cardnumber", "card_number", "cvv", "password", "token", "secret", "public_key", "publickey"];

const REDACTED: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|f| key.contains(f))
}

/// Returns a copy of `value` with every field whose name looks sensitive replaced by `[REDACTED]`, at any depth.
/// Use this before logging any request or gateway payload.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) { Value::String(REDACTED.to_string()) } else { redact_json(v) };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}
