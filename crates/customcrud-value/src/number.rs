use serde::{Deserialize, Serialize};

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_EXACT_F64_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Numeric payload of a `DynamicValue::Number`.
///
/// `Float` is the default 64-bit representation. `Precise` keeps the decimal
/// text exactly as it appeared on the wire so no significant digits are lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Number {
    Float(f64),
    Precise(String),
}

impl Number {
    /// Builds a high-precision number from decimal text, rejecting anything
    /// that is not a valid JSON number.
    pub fn precise(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        trimmed
            .parse::<serde_json::Number>()
            .ok()
            .map(|_| Self::Precise(trimmed.to_string()))
    }

    /// Returns the nearest `f64`, parsing precise text when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Precise(text) => text.parse::<f64>().ok(),
        }
    }

    /// Converts to a JSON number. Non-finite floats have no JSON form.
    pub fn to_json(&self) -> Option<serde_json::Number> {
        match self {
            Self::Float(value) => {
                if !value.is_finite() {
                    return None;
                }
                if value.fract() == 0.0 && value.abs() <= MAX_EXACT_F64_INTEGER {
                    return Some(serde_json::Number::from(*value as i64));
                }
                serde_json::Number::from_f64(*value)
            }
            Self::Precise(text) => text.parse::<serde_json::Number>().ok(),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(left), Self::Float(right)) => left == right,
            (Self::Precise(left), Self::Precise(right)) => left == right,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(left), Some(right)) => left == right,
                _ => false,
            },
        }
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self::Float(value as f64)
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_json() {
            Some(number) => write!(f, "{number}"),
            None => match self {
                Self::Float(value) => write!(f, "{value}"),
                Self::Precise(text) => f.write_str(text),
            },
        }
    }
}
