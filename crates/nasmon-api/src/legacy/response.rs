// Legacy response wrapper
//
// The legacy endpoints are a mix of PHP scripts, static JSON files and
// HTML pages. Callers decide what counts as success; this type only
// carries status, content type and body.

use reqwest::StatusCode;

use crate::error::Error;

/// A fully-read response from a legacy web endpoint.
#[derive(Debug, Clone)]
pub struct LegacyResponse {
    status: StatusCode,
    content_type: Option<String>,
    text: String,
}

impl LegacyResponse {
    pub fn new(status: StatusCode, content_type: Option<String>, text: String) -> Self {
        Self {
            status,
            content_type,
            text,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Only `200 OK` counts; the companion scripts never answer 204/206.
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse the body as JSON regardless of the declared content type.
    pub fn json(&self) -> Result<serde_json::Value, Error> {
        serde_json::from_str(&self.text).map_err(|e| {
            let preview = preview(&self.text);
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: self.text.clone(),
            }
        })
    }
}

/// First 200 bytes of a body, cut on a char boundary.
pub(crate) fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
