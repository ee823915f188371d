// ── Source identity ──
//
// Where an update came from. Together with an update's suffix this gives
// the unique ID consumers key their entities by, so it must never change
// between runs for the same host, collector and item.

use std::fmt;

use serde::Serialize;

/// The (host, collector) pair a batch of updates belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceIdentity {
    pub host: String,
    pub collector: String,
}

impl SourceIdentity {
    pub fn new(host: impl Into<String>, collector: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            collector: collector.into(),
        }
    }

    /// `{host}_{collector}_{suffix}`, slugified.
    pub fn unique_id(&self, suffix: &str) -> String {
        slugify(&format!("{}_{}_{}", self.host, self.collector, suffix))
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.collector)
    }
}

/// Lowercase ASCII alphanumerics separated by single underscores.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
