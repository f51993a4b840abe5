use serde::{Deserialize, Serialize};

pub const DEFAULT_MESSAGE_FIELD: &str = "message";

pub const ACTION_ID: &str = "656;a";
pub const APEX_EXECUTE_DESCRIPTOR: &str = "aura://ApexActionController/ACTION$execute";
pub const CALLING_DESCRIPTOR: &str = "UNKNOWN";

/// The `{"actions": [...]}` wrapper Aura accepts in its `message` form field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub actions: Vec<ActionRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub id: String,
    pub descriptor: String,
    pub calling_descriptor: String,
    pub params: ApexActionParams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApexActionParams {
    pub namespace: String,
    pub classname: String,
    pub method: String,
    pub cacheable: bool,
    pub is_continuation: bool,
}

impl ActionEnvelope {
    /// A single `ApexActionController/ACTION$execute` call of `classname.method`.
    pub fn apex_execute(namespace: &str, classname: &str, method: &str) -> Self {
        Self {
            actions: vec![ActionRequest {
                id: ACTION_ID.to_string(),
                descriptor: APEX_EXECUTE_DESCRIPTOR.to_string(),
                calling_descriptor: CALLING_DESCRIPTOR.to_string(),
                params: ApexActionParams {
                    namespace: namespace.to_string(),
                    classname: classname.to_string(),
                    method: method.to_string(),
                    cacheable: false,
                    is_continuation: false,
                },
            }],
        }
    }

    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Replaces the value of the first `field=` in `body` (up to the next `&` or
/// whitespace). A body without the field comes back unchanged.
pub fn splice_field(body: &str, field: &str, value: &str) -> String {
    let needle = format!("{field}=");
    let start = match body.find(&needle) {
        Some(idx) => idx + needle.len(),
        None => return body.to_string(),
    };
    let end = body[start..]
        .find(|c: char| c == '&' || c.is_whitespace())
        .map(|i| start + i)
        .unwrap_or(body.len());

    let mut out = String::with_capacity(body.len() - (end - start) + value.len());
    out.push_str(&body[..start]);
    out.push_str(value);
    out.push_str(&body[end..]);
    out
}

pub fn has_field(body: &str, field: &str) -> bool {
    body.contains(&format!("{field}="))
}

pub fn synthesize_body(
    original: &str,
    field: &str,
    namespace: &str,
    classname: &str,
    method: &str,
) -> Result<String, serde_json::Error> {
    let message = ActionEnvelope::apex_execute(namespace, classname, method).to_message()?;
    Ok(splice_field(original, field, &message))
}

/// Pulls the envelope back out of a synthesized body.
pub fn extract_envelope(body: &str, field: &str) -> Option<ActionEnvelope> {
    let needle = format!("{field}=");
    let start = body.find(&needle)? + needle.len();
    let rest = &body[start..];
    let end = rest
        .find(|c: char| c == '&' || c.is_whitespace())
        .unwrap_or(rest.len());
    serde_json::from_str(&rest[..end]).ok()
}
