pub mod payload;

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub use payload::{
    splice_field, synthesize_body, ActionEnvelope, ActionRequest, ApexActionParams,
    DEFAULT_MESSAGE_FIELD,
};

pub const DEFAULT_SCHEME: &str = "https";

static POST_LINE_RE: OnceLock<Regex> = OnceLock::new();
static HOST_LINE_RE: OnceLock<Regex> = OnceLock::new();

fn post_line_re() -> &'static Regex {
    POST_LINE_RE
        .get_or_init(|| Regex::new(r"(?m)^POST\s+(\S+)").expect("POST line pattern is valid"))
}

fn host_line_re() -> &'static Regex {
    HOST_LINE_RE
        .get_or_init(|| Regex::new(r"(?im)^Host:[ \t]*(\S+)").expect("Host line pattern is valid"))
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("POST request line not found in request transcript")]
    MissingRequestLine,

    #[error("Host header not found in request transcript")]
    MissingHostHeader,

    #[error("HTTP body missing from request transcript (no blank line after headers)")]
    MissingBody,
}

#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("failed to read request file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request file {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: TemplateError,
    },
}

/// A captured Aura POST, replayed once per candidate with a new body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTemplate {
    url: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl RequestTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        Self::parse_with_scheme(raw, DEFAULT_SCHEME)
    }

    /// The URL is `scheme://host` + the request path, concatenated verbatim.
    pub fn parse_with_scheme(raw: &str, scheme: &str) -> Result<Self, TemplateError> {
        let path = post_line_re()
            .captures(raw)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str())
            .ok_or(TemplateError::MissingRequestLine)?;

        let host = host_line_re()
            .captures(raw)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str())
            .ok_or(TemplateError::MissingHostHeader)?;

        let (head, body) = split_head_body(raw).ok_or(TemplateError::MissingBody)?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if line.starts_with("POST") || line.to_lowercase().starts_with("host") {
                continue;
            }
            let name = name.trim();
            if name.is_empty() || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            let value = value.trim().to_string();
            match headers.iter_mut().find(|(k, _)| k == name) {
                Some(existing) => existing.1 = value,
                None => headers.push((name.to_string(), value)),
            }
        }

        Ok(Self {
            url: format!("{scheme}://{host}{path}"),
            headers,
            body: body.to_string(),
        })
    }

    pub fn from_file(path: &Path, scheme: &str) -> Result<Self, TemplateLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_with_scheme(&raw, scheme).map_err(|source| TemplateLoadError::Invalid {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

fn split_head_body(raw: &str) -> Option<(&str, &str)> {
    let lf = raw.find("\n\n").map(|i| (i, 2));
    let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
    let (idx, sep_len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&raw[..idx], &raw[idx + sep_len..]))
}
