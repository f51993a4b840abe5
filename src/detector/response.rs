use serde::Serialize;
use serde_json::Value;

// Aura may prefix JSON replies with an anti-hijacking guard.
const JSON_GUARDS: [&str; 2] = ["while(1);", "for(;;);"];

/// What came back for one action call.
#[derive(Clone, Debug, PartialEq)]
pub enum ReturnValue {
    /// `actions[0].returnValue` of a well-formed reply.
    Parsed(Value),
    /// The reply was not the expected shape; holds the raw response text.
    Unparsed(String),
    /// The request itself failed; holds the transport error text.
    TransportError(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Parsed,
    Unparsed,
    TransportError,
}

impl ReturnKind {
    pub fn label(self) -> &'static str {
        match self {
            ReturnKind::Parsed => "parsed",
            ReturnKind::Unparsed => "unparsed",
            ReturnKind::TransportError => "transport_error",
        }
    }
}

impl ReturnValue {
    pub fn from_response_body(raw: &str) -> Self {
        match first_return_value(raw) {
            Some(value) => ReturnValue::Parsed(value),
            None => ReturnValue::Unparsed(raw.to_string()),
        }
    }

    pub fn kind(&self) -> ReturnKind {
        match self {
            ReturnValue::Parsed(_) => ReturnKind::Parsed,
            ReturnValue::Unparsed(_) => ReturnKind::Unparsed,
            ReturnValue::TransportError(_) => ReturnKind::TransportError,
        }
    }

    /// Strings verbatim, objects and arrays as compact JSON, other scalars as
    /// their JSON literal.
    pub fn text(&self) -> String {
        match self {
            ReturnValue::Parsed(Value::String(s)) => s.clone(),
            ReturnValue::Parsed(other) => other.to_string(),
            ReturnValue::Unparsed(raw) => {
                format!("Could not parse returnValue. Full response:\n{raw}")
            }
            ReturnValue::TransportError(err) => format!("Request failed: {err}"),
        }
    }
}

fn strip_json_guard(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    for guard in JSON_GUARDS {
        if let Some(rest) = trimmed.strip_prefix(guard) {
            return rest;
        }
    }
    trimmed
}

// A missing `actions` key or `returnValue` reads as an empty string; any
// other deviation from `{"actions":[{...}]}` is a parse failure.
fn first_return_value(raw: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(strip_json_guard(raw)).ok()?;
    let root = value.as_object()?;
    let actions = match root.get("actions") {
        Some(actions) => actions,
        None => return Some(Value::String(String::new())),
    };
    let first = actions.as_array()?.first()?.as_object()?;
    Some(
        first
            .get("returnValue")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
    )
}
