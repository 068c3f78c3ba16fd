use customcrud_exec::SensitiveMasker;
use customcrud_value::{NumberMode, ValueCodec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Provider-level settings as supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    /// Maximum number of hooks in flight; `0` or absent means unlimited.
    pub parallelism: Option<u32>,
    pub high_precision_numbers: Option<bool>,
    /// Merged under every object's input.
    pub default_inputs: Option<Value>,
    /// Like `default_inputs` but masked everywhere it could be logged.
    pub sensitive_default_inputs: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be a JSON object, got {kind}")]
    DefaultsNotObject { field: &'static str, kind: &'static str },
}

/// Immutable provider configuration, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    parallelism: u32,
    number_mode: NumberMode,
    default_inputs: Map<String, Value>,
    sensitive_default_inputs: Map<String, Value>,
    masker: SensitiveMasker,
}

impl ProviderConfig {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let default_inputs = defaults_object("default_inputs", settings.default_inputs.as_ref())?;
        let sensitive_default_inputs = defaults_object(
            "sensitive_default_inputs",
            settings.sensitive_default_inputs.as_ref(),
        )?;
        let masker =
            SensitiveMasker::from_sensitive_inputs(settings.sensitive_default_inputs.as_ref());
        Ok(Self {
            parallelism: settings.parallelism.unwrap_or(0),
            number_mode: NumberMode::from_high_precision(
                settings.high_precision_numbers.unwrap_or(false),
            ),
            default_inputs,
            sensitive_default_inputs,
            masker,
        })
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn number_mode(&self) -> NumberMode {
        self.number_mode
    }

    pub fn codec(&self) -> ValueCodec {
        ValueCodec::new(self.number_mode)
    }

    pub fn masker(&self) -> &SensitiveMasker {
        &self.masker
    }

    pub fn default_inputs(&self) -> &Map<String, Value> {
        &self.default_inputs
    }

    pub fn sensitive_default_inputs(&self) -> &Map<String, Value> {
        &self.sensitive_default_inputs
    }

    /// Layers the configured defaults under an object's explicit input.
    ///
    /// Sensitive defaults override plain defaults and the explicit input
    /// overrides both. A non-object input replaces the defaults wholesale.
    pub fn layer_defaults(&self, explicit: Value) -> Value {
        if self.default_inputs.is_empty() && self.sensitive_default_inputs.is_empty() {
            return explicit;
        }
        let overrides = match explicit {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return other,
        };
        let mut layered = self.default_inputs.clone();
        layered.extend(self.sensitive_default_inputs.clone());
        layered.extend(overrides);
        Value::Object(layered)
    }
}

fn defaults_object(
    field: &'static str,
    value: Option<&Value>,
) -> Result<Map<String, Value>, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(ConfigError::DefaultsNotObject {
            field,
            kind: json_kind(other),
        }),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
