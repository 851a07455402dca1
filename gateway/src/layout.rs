//! Layout templating
//!
//! A receiver config may carry a `layout`: a mapping whose leaf strings
//! are templates rendered with the enhanced event as context. Structure
//! is preserved - maps stay maps, sequences stay sequences - only leaf
//! strings are interpolated.
//!
//! Template syntax is `{{ .path.to.field }}` where the path walks the
//! event's JSON form, e.g. `{{ .reason }}`, `{{ .involvedObject.name }}`
//! or `{{ .metadata.namespace }}`. A template that is exactly one
//! placeholder resolving to a non-string value keeps that value's type;
//! placeholders embedded in longer text stringify their value.

use serde_json::Value;
use thiserror::Error;

use crate::event::EnhancedEvent;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("unterminated placeholder in template '{template}'")]
    Unterminated { template: String },

    #[error("path '{path}' not found in event")]
    UnknownPath { path: String },
}

/// Reshape an event through a layout. Leaves that are not strings pass
/// through untouched.
pub fn render_layout(layout: &Value, event: &EnhancedEvent) -> Result<Value, LayoutError> {
    let context = event.to_json();
    render_value(layout, &context)
}

fn render_value(node: &Value, context: &Value) -> Result<Value, LayoutError> {
    match node {
        Value::String(template) => render_template_value(template, context),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), render_value(value, context)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_value(item, context)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

/// Render a single template string against a JSON context.
pub fn render_template(template: &str, context: &Value) -> Result<String, LayoutError> {
    match render_template_value(template, context)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn render_template_value(template: &str, context: &Value) -> Result<Value, LayoutError> {
    // Fast path: a template that is exactly one placeholder keeps the
    // resolved value's JSON type.
    let trimmed = template.trim();
    if trimmed.starts_with("{{") && trimmed.ends_with("}}") && trimmed.matches("{{").count() == 1 {
        let path = trimmed[2..trimmed.len() - 2].trim();
        return resolve_path(path, context).cloned().ok_or_else(|| LayoutError::UnknownPath {
            path: path.to_string(),
        });
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| LayoutError::Unterminated {
            template: template.to_string(),
        })?;
        let path = after[..end].trim();
        let value = resolve_path(path, context).ok_or_else(|| LayoutError::UnknownPath {
            path: path.to_string(),
        })?;
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

/// Walk a `.a.b.c` path through the context. The leading dot refers to
/// the event root.
fn resolve_path<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.trim_start_matches('.').split('.') {
        if segment.is_empty() {
            continue;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> EnhancedEvent {
        let mut ev = EnhancedEvent::default();
        ev.metadata.namespace = Some("default".into());
        ev.reason = "BackOff".into();
        ev.type_ = "Warning".into();
        ev.count = 7;
        ev.involved_object.reference.name = Some("web-0".into());
        ev.involved_object.reference.kind = Some("Pod".into());
        ev
    }

    #[test]
    fn test_simple_interpolation() {
        let ctx = sample_event().to_json();
        assert_eq!(render_template("{{ .reason }}", &ctx).unwrap(), "BackOff");
        assert_eq!(
            render_template("reason={{ .reason }} kind={{ .involvedObject.kind }}", &ctx).unwrap(),
            "reason=BackOff kind=Pod"
        );
    }

    #[test]
    fn test_nested_path() {
        let ctx = sample_event().to_json();
        assert_eq!(
            render_template("{{ .metadata.namespace }}", &ctx).unwrap(),
            "default"
        );
    }

    #[test]
    fn test_single_placeholder_keeps_type() {
        let event = sample_event();
        let layout = json!({"occurrences": "{{ .count }}"});
        let rendered = render_layout(&layout, &event).unwrap();
        assert_eq!(rendered["occurrences"], json!(7));
    }

    #[test]
    fn test_unknown_path_errors() {
        let ctx = sample_event().to_json();
        let err = render_template("{{ .nope.nothing }}", &ctx).unwrap_err();
        assert!(err.to_string().contains("nope.nothing"));
    }

    #[test]
    fn test_unterminated_placeholder_errors() {
        let ctx = sample_event().to_json();
        assert!(render_template("{{ .reason", &ctx).is_err());
    }

    #[test]
    fn test_layout_preserves_structure() {
        let event = sample_event();
        let layout = json!({
            "summary": {
                "text": "{{ .reason }} on {{ .involvedObject.name }}",
                "severity": "{{ .type }}",
            },
            "tags": ["k8s", "{{ .metadata.namespace }}"],
            "static": 42,
        });

        let rendered = render_layout(&layout, &event).unwrap();
        assert_eq!(rendered["summary"]["text"], "BackOff on web-0");
        assert_eq!(rendered["summary"]["severity"], "Warning");
        assert_eq!(rendered["tags"], json!(["k8s", "default"]));
        assert_eq!(rendered["static"], 42);
    }
}
