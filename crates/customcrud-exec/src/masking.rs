use std::collections::BTreeSet;

use serde_json::Value;

/// Replacement text for every redacted key or value.
pub const REDACTION_MARKER: &str = "***";

/// Redacts configured secrets from text headed for logs and diagnostics.
///
/// Built from the sensitive default inputs: their top-level keys drive
/// structured masking of JSON documents, and every non-empty string leaf is
/// masked as a plain substring in free text such as stderr. Masking never
/// touches what is actually sent to the hook process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensitiveMasker {
    keys: BTreeSet<String>,
    values: Vec<String>,
}

impl SensitiveMasker {
    pub fn new<K, V>(keys: K, values: V) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for value in values {
            let value = value.into();
            if !value.is_empty() && !collected.contains(&value) {
                collected.push(value);
            }
        }
        // Longest first so a secret containing another secret is masked whole.
        collected.sort_by(|left, right| right.len().cmp(&left.len()));
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            values: collected,
        }
    }

    /// Derives keys and values from a sensitive-inputs document.
    pub fn from_sensitive_inputs(sensitive_inputs: Option<&Value>) -> Self {
        let Some(document) = sensitive_inputs else {
            return Self::default();
        };
        let keys = match document {
            Value::Object(map) => map.keys().cloned().collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        let mut values = Vec::new();
        collect_string_leaves(document, &mut values);
        Self::new(keys, values)
    }

    pub fn sensitive_keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.values.is_empty()
    }

    /// Replaces the value of every sensitive key anywhere in a JSON document.
    ///
    /// Text that does not parse as JSON is returned unchanged.
    pub fn mask_json(&self, raw: &str) -> String {
        if self.keys.is_empty() {
            return raw.to_string();
        }
        let Ok(mut document) = serde_json::from_str::<Value>(raw) else {
            return raw.to_string();
        };
        self.mask_value(&mut document);
        serde_json::to_string(&document).unwrap_or_else(|_| raw.to_string())
    }

    /// Applies structured masking to an already parsed document.
    pub fn mask_value(&self, document: &mut Value) {
        match document {
            Value::Object(map) => {
                for (key, value) in map.iter_mut() {
                    if self.keys.contains(key) {
                        *value = Value::String(REDACTION_MARKER.to_string());
                    } else {
                        self.mask_value(value);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.mask_value(item);
                }
            }
            _ => {}
        }
    }

    /// Replaces every occurrence of a sensitive value in free text.
    pub fn mask_values(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for value in &self.values {
            if masked.contains(value.as_str()) {
                masked = masked.replace(value.as_str(), REDACTION_MARKER);
            }
        }
        masked
    }
}

fn collect_string_leaves(document: &Value, values: &mut Vec<String>) {
    match document {
        Value::Object(map) => {
            for value in map.values() {
                collect_string_leaves(value, values);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, values);
            }
        }
        Value::String(text) => values.push(text.clone()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SensitiveMasker;

    fn keys(names: &[&str]) -> SensitiveMasker {
        SensitiveMasker::new(names.iter().copied(), Vec::<String>::new())
    }

    #[test]
    fn unit_mask_json_replaces_single_key() {
        assert_eq!(keys(&["token"]).mask_json(r#"{"token":"abc"}"#), r#"{"token":"***"}"#);
    }

    #[test]
    fn unit_mask_json_without_keys_returns_input_verbatim() {
        let raw = r#"{"name": "test", "key": "secret"}"#;
        assert_eq!(keys(&[]).mask_json(raw), raw);
    }

    #[test]
    fn unit_mask_json_returns_malformed_input_unchanged() {
        assert_eq!(keys(&["key"]).mask_json("not valid json"), "not valid json");
    }

    #[test]
    fn unit_mask_json_handles_multiple_and_nested_keys() {
        let masker = keys(&["api_key", "token"]);
        assert_eq!(
            masker.mask_json(r#"{"name":"test","api_key":"secret1","token":"secret2"}"#),
            r#"{"api_key":"***","name":"test","token":"***"}"#
        );
        assert_eq!(
            masker.mask_json(r#"{"input":{"api_key":"nested-secret","name":"test"}}"#),
            r#"{"input":{"api_key":"***","name":"test"}}"#
        );
        assert_eq!(
            masker.mask_json(r#"{"items":[{"api_key":"secret1"},{"api_key":"secret2"}]}"#),
            r#"{"items":[{"api_key":"***"},{"api_key":"***"}]}"#
        );
    }

    #[test]
    fn unit_mask_json_leaves_documents_without_matches_alone() {
        assert_eq!(keys(&["api_key"]).mask_json(r#"{"name":"test"}"#), r#"{"name":"test"}"#);
    }

    #[test]
    fn unit_mask_values_replaces_every_occurrence() {
        let masker = SensitiveMasker::from_sensitive_inputs(Some(&json!({
            "url": "https://api.example.com",
            "key": "abc123",
        })));
        assert_eq!(
            masker.mask_values("connecting to https://api.example.com with key abc123 (abc123)"),
            "connecting to *** with key *** (***)"
        );
    }

    #[test]
    fn unit_mask_values_skips_empty_strings() {
        let masker = SensitiveMasker::from_sensitive_inputs(Some(&json!({"empty": ""})));
        assert_eq!(
            masker.mask_values("error: something went wrong"),
            "error: something went wrong"
        );
    }

    #[test]
    fn unit_mask_values_without_sensitive_inputs_is_identity() {
        let masker = SensitiveMasker::from_sensitive_inputs(None);
        assert!(masker.is_empty());
        assert_eq!(masker.mask_values("secret-value leaked"), "secret-value leaked");
    }

    #[test]
    fn functional_sensitive_inputs_collect_nested_string_leaves() {
        let masker = SensitiveMasker::from_sensitive_inputs(Some(&json!({
            "auth": {"user": "svc", "tokens": ["t-1", "t-2"]},
            "retries": 3,
        })));
        assert_eq!(
            masker.sensitive_keys().collect::<Vec<_>>(),
            vec!["auth", "retries"]
        );
        assert_eq!(masker.mask_values("svc used t-2 then t-1"), "*** used *** then ***");
    }

    #[test]
    fn regression_non_object_sensitive_inputs_yield_no_keys() {
        let masker = SensitiveMasker::from_sensitive_inputs(Some(&json!(["only-a-value"])));
        assert_eq!(masker.sensitive_keys().count(), 0);
        assert_eq!(masker.mask_json(r#"{"a":"only-a-value"}"#), r#"{"a":"only-a-value"}"#);
        assert_eq!(masker.mask_values("only-a-value"), "***");
    }
}
