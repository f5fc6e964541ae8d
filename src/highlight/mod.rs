
use serde_json::Value;

/// A highlightable payload in tagged form.
///
/// Hosts deliver loosely shaped highlight messages: a bare string, an
/// object carrying `content`, or nested arrays of either. This enum is
/// the normalized shape; [`flatten_all`] turns any mix of them into the
/// ordered list of strings the rendering layer should search for. DOM
/// traversal itself stays with the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightSource {
    Plain(String),
    Structured {
        content: String,
        children: Vec<HighlightSource>,
    },
}

impl HighlightSource {
    fn flatten_into(&self, out: &mut Vec<String>) {
        match self {
            Self::Plain(text) => {
                if !text.is_empty() {
                    out.push(text.clone());
                }
            }
            Self::Structured { content, children } => {
                if !content.is_empty() {
                    out.push(content.clone());
                }
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }
}

impl From<String> for HighlightSource {
    #[inline]
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

impl From<&str> for HighlightSource {
    #[inline]
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

/// Depth-first flattening of highlight sources into non-empty strings,
/// preserving order.
#[inline]
pub fn flatten_all(sources: &[HighlightSource]) -> Vec<String> {
    let mut out = Vec::new();
    for source in sources {
        source.flatten_into(&mut out);
    }
    out
}

/// Convert a loosely shaped JSON highlight payload into tagged sources.
///
/// Accepted shapes: a string, an object with a string `content` field and
/// an optional `children` array, or an array of any of these, nested
/// arbitrarily. Anything else is ignored.
#[inline]
pub fn sources_from_json(value: &Value) -> Vec<HighlightSource> {
    match value {
        Value::String(text) => vec![HighlightSource::Plain(text.clone())],
        Value::Array(items) => items.iter().flat_map(sources_from_json).collect(),
        Value::Object(fields) => {
            let content = fields
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let children = fields
                .get("children")
                .map(sources_from_json)
                .unwrap_or_default();
            if content.is_empty() && children.is_empty() {
                Vec::new()
            } else {
                vec![HighlightSource::Structured { content, children }]
            }
        }
        _ => Vec::new(),
    }
}
