use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON document written to a hook's stdin.
///
/// Empty fields are omitted from the wire form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub input: Value,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub output: Value,
}

fn is_absent(value: &Value) -> bool {
    value.is_null()
}

impl ExecutionPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }
}

/// Everything observed from one hook invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// Exact payload text written to stdin.
    pub payload: String,
    /// Parsed stdout; `None` when the hook printed nothing.
    pub result: Option<Map<String, Value>>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub masked_payload: String,
    pub masked_stdout: String,
    pub masked_stderr: String,
}
