use serde_json::{Map, Value};

use crate::number::Number;
use crate::value::DynamicValue;

/// Selects how JSON numbers are decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NumberMode {
    /// Standard double precision.
    #[default]
    Float64,
    /// Keep every significant digit of the decimal text.
    HighPrecision,
}

impl NumberMode {
    pub fn from_high_precision(enabled: bool) -> Self {
        if enabled {
            Self::HighPrecision
        } else {
            Self::Float64
        }
    }
}

/// Converts between `DynamicValue` and generic JSON.
///
/// # Examples
///
/// ```
/// use customcrud_value::{DynamicValue, NumberMode, ValueCodec};
/// use serde_json::json;
///
/// let codec = ValueCodec::new(NumberMode::Float64);
/// let tags = DynamicValue::set(vec!["a".into(), "b".into()]);
/// let wire = codec.encode(&tags);
/// assert_eq!(wire, json!(["a", "b"]));
///
/// // Without a hint the array comes back as a list; with one it stays a set.
/// assert!(matches!(codec.decode(&wire), DynamicValue::List { .. }));
/// assert!(matches!(codec.decode_hinted(&wire, Some(&tags)), DynamicValue::Set { .. }));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueCodec {
    mode: NumberMode,
}

impl ValueCodec {
    pub fn new(mode: NumberMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> NumberMode {
        self.mode
    }

    /// Encodes a value as JSON. Null and unknown both become JSON null.
    pub fn encode(&self, value: &DynamicValue) -> Value {
        match value {
            DynamicValue::Null | DynamicValue::Unknown => Value::Null,
            DynamicValue::String(text) => Value::String(text.clone()),
            DynamicValue::Number(number) => self
                .encode_number(number)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DynamicValue::Bool(flag) => Value::Bool(*flag),
            DynamicValue::List { elements, .. }
            | DynamicValue::Set { elements, .. }
            | DynamicValue::Tuple(elements) => {
                Value::Array(elements.iter().map(|element| self.encode(element)).collect())
            }
            DynamicValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), self.encode(value)))
                    .collect(),
            ),
        }
    }

    fn encode_number(&self, number: &Number) -> Option<serde_json::Number> {
        match (self.mode, number) {
            (NumberMode::HighPrecision, _) | (NumberMode::Float64, Number::Float(_)) => {
                number.to_json()
            }
            (NumberMode::Float64, Number::Precise(_)) => number
                .as_f64()
                .and_then(|value| Number::Float(value).to_json())
                .or_else(|| number.to_json()),
        }
    }

    /// Decodes JSON without any prior shape: uniform arrays become lists,
    /// mixed arrays become tuples.
    pub fn decode(&self, json: &Value) -> DynamicValue {
        match json {
            Value::Null => DynamicValue::Null,
            Value::Bool(flag) => DynamicValue::Bool(*flag),
            Value::Number(number) => self.decode_number(number),
            Value::String(text) => DynamicValue::String(text.clone()),
            Value::Array(items) => {
                DynamicValue::list(items.iter().map(|item| self.decode(item)).collect())
            }
            Value::Object(map) => self.decode_object(map),
        }
    }

    pub fn decode_object(&self, map: &Map<String, Value>) -> DynamicValue {
        DynamicValue::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), self.decode(value)))
                .collect(),
        )
    }

    fn decode_number(&self, number: &serde_json::Number) -> DynamicValue {
        match self.mode {
            NumberMode::HighPrecision => {
                let text = number.to_string();
                DynamicValue::Number(Number::precise(&text).unwrap_or(Number::Precise(text)))
            }
            // Out of f64 range: keep the decimal text rather than lose the value.
            NumberMode::Float64 => match number.as_f64().filter(|value| value.is_finite()) {
                Some(value) => DynamicValue::Number(Number::Float(value)),
                None => DynamicValue::Number(Number::Precise(number.to_string())),
            },
        }
    }

    /// Decodes JSON in lockstep with a prior value of the same slot so the
    /// declared collection shape survives the round trip. Positions without
    /// a usable hint fall back to [`ValueCodec::decode`].
    pub fn decode_hinted(&self, json: &Value, hint: Option<&DynamicValue>) -> DynamicValue {
        match (json, hint) {
            (Value::Array(items), Some(DynamicValue::Set { elements, .. })) => {
                let element_hint = elements.first();
                DynamicValue::set(
                    items
                        .iter()
                        .map(|item| self.decode_hinted(item, element_hint))
                        .collect(),
                )
            }
            (Value::Array(items), Some(DynamicValue::List { elements, .. })) => DynamicValue::list(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.decode_hinted(item, elements.get(index).or(elements.first()))
                    })
                    .collect(),
            ),
            (Value::Array(items), Some(DynamicValue::Tuple(elements))) => DynamicValue::Tuple(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.decode_hinted(item, elements.get(index)))
                    .collect(),
            ),
            (Value::Object(map), Some(DynamicValue::Object(fields))) => DynamicValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), self.decode_hinted(value, fields.get(key))))
                    .collect(),
            ),
            _ => self.decode(json),
        }
    }

    /// Overwrites every attribute of `input` that also appears in `output`,
    /// decoding the replacement with the old attribute as its shape hint.
    /// Keys only present in `output` are ignored; non-object inputs are
    /// returned unchanged.
    pub fn merge_input_with_output(
        &self,
        input: &DynamicValue,
        output: &Map<String, Value>,
    ) -> DynamicValue {
        let DynamicValue::Object(fields) = input else {
            return input.clone();
        };
        DynamicValue::Object(
            fields
                .iter()
                .map(|(key, current)| {
                    let merged = match output.get(key) {
                        Some(replacement) => self.decode_hinted(replacement, Some(current)),
                        None => current.clone(),
                    };
                    (key.clone(), merged)
                })
                .collect(),
        )
    }
}
