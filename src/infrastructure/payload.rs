//! Inbound payload normalization shared by the HTTP and SNMP ingress.

use serde_json::Value;

use crate::domain::models::config::CsvFieldRule;

/// Sanitize a key for use as a payload field name: spaces, colons and dots
/// become underscores.
pub fn key_translate(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            ' ' | ':' | '.' => '_',
            c => c,
        })
        .collect()
}

/// Split configured CSV-style fields into `field__subkey` entries.
///
/// A value like `host:srv01;svc:disk` under field `F` with separators
/// `;` / `:` yields `F__host = "srv01"` and `F__svc = "disk"` next to the
/// untouched original.
pub fn expand_csv_fields(data: &mut Value, rules: &[CsvFieldRule]) {
    let Value::Object(map) = data else { return };

    for rule in rules {
        let Some(Value::String(raw)) = map.get(&rule.field).cloned() else {
            continue;
        };
        for item in raw.split(&rule.item_separator) {
            let mut parts = item.splitn(2, &rule.kv_separator);
            let key = parts.next().unwrap_or_default().trim();
            let value = parts.next().unwrap_or_default().trim();
            map.insert(
                format!("{}__{}", rule.field, key_translate(key)),
                Value::String(value.to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(field: &str) -> CsvFieldRule {
        CsvFieldRule {
            field: field.to_string(),
            item_separator: ";".to_string(),
            kv_separator: ":".to_string(),
        }
    }

    #[test]
    fn expands_subfields_with_sanitized_keys() {
        let mut data = json!({"details": "host name:srv01; state:down:hard"});
        expand_csv_fields(&mut data, &[rule("details")]);

        assert_eq!(data["details__host_name"], "srv01");
        // the remainder keeps its inner separators
        assert_eq!(data["details__state"], "down:hard");
        // the original field is untouched
        assert_eq!(data["details"], "host name:srv01; state:down:hard");
    }

    #[test]
    fn ignores_absent_and_non_string_fields() {
        let mut data = json!({"other": 5});
        expand_csv_fields(&mut data, &[rule("details")]);
        assert_eq!(data, json!({"other": 5}));
    }
}
