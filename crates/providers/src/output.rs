//! Per-provider result extraction.
//!
//! Providers disagree on the shape of a finished prediction's `output`:
//! some return a bare URL or a list of URLs, others an object with the
//! artifact under one of several keys. Each configured backend names its
//! shape explicitly instead of sharing one heuristic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputAdapter {
    /// `output` is a URL string or an array of URL strings.
    #[default]
    Direct,
    /// `output` is an object; the first key in `keys` holding a URL (or an
    /// array of URLs) wins.
    Fields { keys: Vec<String> },
}

impl OutputAdapter {
    /// Convenience constructor for a [`OutputAdapter::Fields`] adapter.
    pub fn fields<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Extract result URLs from `output`. Returns an empty list when the
    /// payload does not match the configured shape.
    pub fn extract(&self, output: &Value) -> Vec<String> {
        match self {
            Self::Direct => urls_in(output),
            Self::Fields { keys } => {
                let Some(object) = output.as_object() else {
                    return Vec::new();
                };
                keys.iter()
                    .filter_map(|key| object.get(key))
                    .map(urls_in)
                    .find(|urls| !urls.is_empty())
                    .unwrap_or_default()
            }
        }
    }
}

fn urls_in(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
