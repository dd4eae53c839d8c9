//! Ticket title/description template rendering.
//!
//! Templates reference stored-document fields as `{field_name}`; a field the
//! document does not carry renders as `N/A`. Values render bare (no quotes)
//! for strings, JSON otherwise.

use serde_json::Value;

const MISSING_FIELD_VALUE: &str = "N/A";

/// Render `template` against the document source.
pub fn render(template: &str, source: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        // `{{` escapes a literal brace
        if chars.peek() == Some(&'{') {
            chars.next();
            out.push('{');
            continue;
        }
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }
        if !closed {
            out.push('{');
            out.push_str(&name);
            break;
        }
        out.push_str(&field_value(source, &name));
    }
    out
}

fn field_value(source: &Value, name: &str) -> String {
    match source.get(name) {
        None | Some(Value::Null) => MISSING_FIELD_VALUE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Value of a dot-separated nested field path, if present.
pub fn nested_field_value(source: &Value, path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let mut current = source;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    match current {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_fields_and_defaults_missing_ones() {
        let source = json!({
            "event_title": "CPU load high",
            "asset_unique_id": "srv01",
            "itsm_ticket": 42,
        });
        assert_eq!(
            render("{event_title} on {asset_unique_id} ({event_level})", &source),
            "CPU load high on srv01 (N/A)"
        );
        assert_eq!(render("ticket {itsm_ticket}", &source), "ticket 42");
    }

    #[test]
    fn double_brace_escapes() {
        assert_eq!(render("{{literal}} {x}", &json!({"x": "y"})), "{literal} y");
    }

    #[test]
    fn nested_field_lookup() {
        let source = json!({"a": {"b": {"c": "deep"}}});
        assert_eq!(nested_field_value(&source, "a.b.c").as_deref(), Some("deep"));
        assert_eq!(nested_field_value(&source, "a.b.missing"), None);
        assert_eq!(nested_field_value(&source, ""), None);
    }
}
