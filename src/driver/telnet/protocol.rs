//! codec command/response wire protocol
//! responses are `+OK {"value":...}` or `-ERR <message>`, anything else is
//! passed through verbatim

use serde_json::Value;

use crate::warn;

const LOG_TAG: &str = "telnet_protocol";

// markers of the interactive login sequence
pub const LOGIN_PROMPT: &str = "login:";
pub const PASSWORD_PROMPT: &str = "Password:";
pub const COMMAND_PROMPT: char = '>';

const RESPONSE_OK_PREFIX: &str = "+OK";
const RESPONSE_ERR_PREFIX: &str = "-ERR";

/// parse one response line into a usable value
/// - `+OK` with a value field: the value as string
/// - bare `+OK`: the success token "OK"
/// - `-ERR`: logged, None
/// - anything else: returned verbatim
pub fn parse_response(raw: &str) -> Option<String> {
    let line = raw.trim_matches(|c: char| c == COMMAND_PROMPT || c.is_whitespace());

    if let Some(rest) = line.strip_prefix(RESPONSE_OK_PREFIX) {
        return match extract_value(rest) {
            Some(value) => Some(value),
            None => Some("OK".to_string()),
        };
    }
    if let Some(rest) = line.strip_prefix(RESPONSE_ERR_PREFIX) {
        warn!(LOG_TAG, "device returned error, msg: {}", rest.trim());
        return None;
    }
    if line.is_empty() {
        return None;
    }
    Some(line.to_string())
}

/// pull the "value" field out of the +OK json payload
fn extract_value(payload: &str) -> Option<String> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    if end < start {
        return None;
    }
    let json: Value = serde_json::from_str(&payload[start..=end]).ok()?;
    match json.get("value")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
