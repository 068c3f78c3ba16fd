use std::{collections::BTreeMap, sync::Arc};

use customcrud_exec::{CancellationToken, ExecutionPayload};
use customcrud_value::DynamicValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    dispatch::ProviderContext,
    error::DispatchError,
    hooks::{CrudHooks, CrudOp},
};

pub const PRIVATE_KEY_HOOKS: &str = "hooks";
pub const PRIVATE_KEY_INPUT: &str = "input";
pub const PRIVATE_KEY_OUTPUT: &str = "output";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrivateStateError {
    #[error("private state value for '{key}' is not valid UTF-8")]
    NotUtf8 { key: String },
    #[error("private state i/o failed: {0}")]
    Storage(String),
}

/// Side-channel key/value store the host keeps for a lease between calls.
pub trait PrivateState: Send + Sync {
    fn get_key(&self, key: &str) -> Result<Option<Vec<u8>>, PrivateStateError>;
    fn set_key(&mut self, key: &str, value: Vec<u8>) -> Result<(), PrivateStateError>;
}

/// In-process private state; serializable so a host can persist it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryPrivateState {
    entries: BTreeMap<String, String>,
}

impl MemoryPrivateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PrivateState for MemoryPrivateState {
    fn get_key(&self, key: &str) -> Result<Option<Vec<u8>>, PrivateStateError> {
        Ok(self.entries.get(key).map(|value| value.as_bytes().to_vec()))
    }

    fn set_key(&mut self, key: &str, value: Vec<u8>) -> Result<(), PrivateStateError> {
        let value = String::from_utf8(value).map_err(|_| PrivateStateError::NotUtf8 {
            key: key.to_string(),
        })?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaseConfig {
    pub hooks: CrudHooks,
    pub input: DynamicValue,
}

/// Result handed back to the host when a lease opens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaseState {
    pub input: DynamicValue,
    pub output: DynamicValue,
}

/// Whether an optional lease hook actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookRun {
    Ran,
    Skipped,
}

/// Open/renew/close lifecycle for short-lived objects such as credentials.
#[derive(Debug, Clone)]
pub struct LeaseHandler {
    context: Arc<ProviderContext>,
}

impl LeaseHandler {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Self {
        Self { context }
    }

    /// Runs the open hook and records hooks, input and output in `private`
    /// for later renew and close calls.
    #[tracing::instrument(
        name = "customcrud_provider.lease.open",
        skip_all,
        fields(op = "open")
    )]
    pub async fn open(
        &self,
        config: &LeaseConfig,
        private: &mut dyn PrivateState,
        cancel: &CancellationToken,
    ) -> Result<LeaseState, DispatchError> {
        let _permit = self.context.admit(CrudOp::Open, cancel).await?;
        let codec = self.context.codec();
        let input = codec.encode(&config.input);
        let payload = ExecutionPayload::new()
            .with_input(self.context.config().layer_defaults(input.clone()));
        let (output, _) = self
            .context
            .run_crud_script(&config.hooks, CrudOp::Open, &payload, cancel)
            .await?
            .into_output(CrudOp::Open, &self.context, &payload)?;
        let output = Value::Object(output);

        store_json(private, PRIVATE_KEY_HOOKS, &config.hooks)?;
        store_json(private, PRIVATE_KEY_INPUT, &input)?;
        store_json(private, PRIVATE_KEY_OUTPUT, &output)?;
        tracing::debug!("lease opened");
        Ok(LeaseState {
            input: config.input.clone(),
            output: codec.decode(&output),
        })
    }

    /// Runs the renew hook if one was recorded at open time.
    #[tracing::instrument(
        name = "customcrud_provider.lease.renew",
        skip_all,
        fields(op = "renew")
    )]
    pub async fn renew(
        &self,
        private: &dyn PrivateState,
        cancel: &CancellationToken,
    ) -> Result<HookRun, DispatchError> {
        let _permit = self.context.admit(CrudOp::Renew, cancel).await?;
        let Some((hooks, payload)) = self.recorded_phase(private, CrudOp::Renew)? else {
            return Ok(HookRun::Skipped);
        };
        self.context
            .run_crud_script(&hooks, CrudOp::Renew, &payload, cancel)
            .await?;
        Ok(HookRun::Ran)
    }

    /// Runs the close hook if one was recorded; its failures are logged and
    /// otherwise ignored.
    #[tracing::instrument(
        name = "customcrud_provider.lease.close",
        skip_all,
        fields(op = "close")
    )]
    pub async fn close(
        &self,
        private: &dyn PrivateState,
        cancel: &CancellationToken,
    ) -> Result<HookRun, DispatchError> {
        let _permit = match self.context.admit(CrudOp::Close, cancel).await {
            Ok(permit) => permit,
            Err(error) => {
                tracing::warn!(error = %error, "close hook not run");
                return Ok(HookRun::Skipped);
            }
        };
        let Some((hooks, payload)) = self.recorded_phase(private, CrudOp::Close)? else {
            return Ok(HookRun::Skipped);
        };
        if let Err(error) = self
            .context
            .run_crud_script(&hooks, CrudOp::Close, &payload, cancel)
            .await
        {
            tracing::warn!(error = %error, "close hook failed");
        }
        Ok(HookRun::Ran)
    }

    /// Loads the recorded hooks and builds the payload for `op`; `None` when
    /// nothing was recorded or the hook is blank.
    fn recorded_phase(
        &self,
        private: &dyn PrivateState,
        op: CrudOp,
    ) -> Result<Option<(CrudHooks, ExecutionPayload)>, DispatchError> {
        let Some(raw_hooks) = read_key(private, PRIVATE_KEY_HOOKS)? else {
            return Ok(None);
        };
        let hooks: CrudHooks =
            serde_json::from_slice(&raw_hooks).map_err(|error| DispatchError::PrivateState {
                key: PRIVATE_KEY_HOOKS,
                message: format!("failed to unmarshal hooks from private state: {error}"),
            })?;
        if !hooks.is_configured(op) {
            return Ok(None);
        }
        let input = read_json_lenient(private, PRIVATE_KEY_INPUT)?;
        let output = read_json_lenient(private, PRIVATE_KEY_OUTPUT)?;
        let payload = ExecutionPayload::new()
            .with_input(self.context.config().layer_defaults(input))
            .with_output(output);
        Ok(Some((hooks, payload)))
    }
}

fn store_json<T: Serialize>(
    private: &mut dyn PrivateState,
    key: &'static str,
    value: &T,
) -> Result<(), DispatchError> {
    let encoded = serde_json::to_vec(value).map_err(|error| DispatchError::PrivateState {
        key,
        message: error.to_string(),
    })?;
    private
        .set_key(key, encoded)
        .map_err(|error| DispatchError::PrivateState {
            key,
            message: error.to_string(),
        })
}

fn read_key(
    private: &dyn PrivateState,
    key: &'static str,
) -> Result<Option<Vec<u8>>, DispatchError> {
    let value = private
        .get_key(key)
        .map_err(|error| DispatchError::PrivateState {
            key,
            message: error.to_string(),
        })?;
    Ok(value.filter(|bytes| !bytes.is_empty()))
}

/// Recorded input/output that no longer parses is sent as null.
fn read_json_lenient(private: &dyn PrivateState, key: &'static str) -> Result<Value, DispatchError> {
    Ok(read_key(private, key)?
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or(Value::Null))
}
