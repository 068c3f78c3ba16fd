use std::sync::Arc;

use customcrud_exec::{CancellationToken, ExecutionPayload};
use customcrud_value::DynamicValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::json_kind,
    dispatch::{ProviderContext, ScriptOutcome},
    error::{DispatchError, FailureReport},
    hooks::{CrudHooks, CrudOp, ObjectKind},
};

/// Persisted state of a managed resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub hooks: CrudHooks,
    #[serde(default)]
    pub input: DynamicValue,
    #[serde(default)]
    pub output: DynamicValue,
}

/// Desired configuration of a resource for the next apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePlan {
    pub hooks: CrudHooks,
    pub input: DynamicValue,
    /// JSON object merged over the input for create and update only; never
    /// persisted.
    pub write_only_input: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(ResourceState),
    /// The read hook exited with code 22; drop the object from tracked state.
    Removed,
}

/// What `apply` did to reach the planned configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Created(ResourceState),
    Updated(ResourceState),
    Replaced(ResourceState),
    Unchanged(ResourceState),
}

impl ApplyOutcome {
    pub fn state(&self) -> &ResourceState {
        match self {
            Self::Created(state)
            | Self::Updated(state)
            | Self::Replaced(state)
            | Self::Unchanged(state) => state,
        }
    }

    pub fn into_state(self) -> ResourceState {
        match self {
            Self::Created(state)
            | Self::Updated(state)
            | Self::Replaced(state)
            | Self::Unchanged(state) => state,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Replaced(_) => "replaced",
            Self::Unchanged(_) => "unchanged",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImportSpec {
    #[serde(default)]
    id: String,
    #[serde(default)]
    hooks: CrudHooks,
    #[serde(default)]
    input: Option<Map<String, Value>>,
    #[serde(default)]
    output: Option<Map<String, Value>>,
}

/// Create/read/update/delete lifecycle of a persistent resource.
#[derive(Debug, Clone)]
pub struct ResourceHandler {
    context: Arc<ProviderContext>,
}

impl ResourceHandler {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Self {
        Self { context }
    }

    #[tracing::instrument(
        name = "customcrud_provider.resource.create",
        skip_all,
        fields(op = "create", id = tracing::field::Empty)
    )]
    pub async fn create(
        &self,
        plan: &ResourcePlan,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, DispatchError> {
        let _permit = self.context.admit(CrudOp::Create, cancel).await?;
        let codec = self.context.codec();
        let payload = ExecutionPayload::new().with_input(self.payload_input(
            CrudOp::Create,
            &plan.input,
            plan.write_only_input.as_deref(),
        )?);
        let (output, execution) = self
            .context
            .run_crud_script(&plan.hooks, CrudOp::Create, &payload, cancel)
            .await?
            .into_output(CrudOp::Create, &self.context, &payload)?;

        let Some(id) = output.get("id").and_then(id_from_json) else {
            return Err(DispatchError::MissingId {
                report: FailureReport::from_result(&execution),
            });
        };
        let state = ResourceState {
            id,
            hooks: plan.hooks.clone(),
            input: codec.merge_input_with_output(&plan.input, &output),
            output: codec.decode_object(&output),
        };
        tracing::Span::current().record("id", state.id.as_str());
        tracing::debug!(id = %state.id, "resource created");
        Ok(state)
    }

    #[tracing::instrument(
        name = "customcrud_provider.resource.read",
        skip_all,
        fields(op = "read", id = %state.id)
    )]
    pub async fn read(
        &self,
        state: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome, DispatchError> {
        let _permit = self.context.admit(CrudOp::Read, cancel).await?;
        match self.refresh(state, cancel).await? {
            Some(refreshed) => Ok(ReadOutcome::Present(refreshed)),
            None => {
                tracing::debug!(id = %state.id, "resource removed by read hook");
                Ok(ReadOutcome::Removed)
            }
        }
    }

    #[tracing::instrument(
        name = "customcrud_provider.resource.update",
        skip_all,
        fields(op = "update", id = %prior.id)
    )]
    pub async fn update(
        &self,
        prior: &ResourceState,
        plan: &ResourcePlan,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, DispatchError> {
        let _permit = self.context.admit(CrudOp::Update, cancel).await?;
        let codec = self.context.codec();
        let payload = ExecutionPayload::new()
            .with_id(prior.id.clone())
            .with_input(self.payload_input(
                CrudOp::Update,
                &plan.input,
                plan.write_only_input.as_deref(),
            )?)
            .with_output(codec.encode(&prior.output));
        let (output, _) = self
            .context
            .run_crud_script(&plan.hooks, CrudOp::Update, &payload, cancel)
            .await?
            .into_output(CrudOp::Update, &self.context, &payload)?;

        let id = output
            .get("id")
            .and_then(id_from_json)
            .unwrap_or_else(|| prior.id.clone());
        let input = codec.merge_input_with_output(&plan.input, &output);
        let output = codec.decode_hinted(&Value::Object(output), Some(&prior.output));
        tracing::debug!(id = %id, "resource updated");
        Ok(ResourceState {
            id,
            hooks: plan.hooks.clone(),
            input,
            output,
        })
    }

    #[tracing::instrument(
        name = "customcrud_provider.resource.delete",
        skip_all,
        fields(op = "delete", id = %state.id)
    )]
    pub async fn delete(
        &self,
        state: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let _permit = self.context.admit(CrudOp::Delete, cancel).await?;
        let payload = self.persisted_payload(state);
        self.context
            .run_crud_script(&state.hooks, CrudOp::Delete, &payload, cancel)
            .await?;
        tracing::debug!(id = %state.id, "resource deleted");
        Ok(())
    }

    /// Adopts an existing object described by an import document
    /// `{"id", "hooks", "input", "output"}` and refreshes it with the read hook.
    #[tracing::instrument(
        name = "customcrud_provider.resource.import",
        skip_all,
        fields(op = "import", id = tracing::field::Empty)
    )]
    pub async fn import(
        &self,
        import_json: &str,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, DispatchError> {
        let spec: ImportSpec =
            serde_json::from_str(import_json).map_err(|error| DispatchError::InvalidImport {
                message: format!(
                    "Failed to parse import JSON: {error}. Import ID must be a JSON string \
                     containing id, hooks, input, and output fields."
                ),
            })?;
        if spec.id.is_empty() {
            return Err(DispatchError::InvalidImport {
                message: "Import JSON must contain a non-empty 'id' field".to_string(),
            });
        }
        tracing::Span::current().record("id", spec.id.as_str());
        if let Err(error) = spec.hooks.validate(ObjectKind::Resource) {
            return Err(DispatchError::InvalidImport {
                message: format!(
                    "Import JSON must contain hooks with at least create, read, and delete \
                     commands ({error})"
                ),
            });
        }

        let codec = self.context.codec();
        let candidate = ResourceState {
            id: spec.id,
            hooks: spec.hooks,
            input: spec
                .input
                .map(|input| codec.decode_object(&input))
                .unwrap_or_default(),
            output: spec
                .output
                .map(|output| codec.decode_object(&output))
                .unwrap_or_default(),
        };

        let _permit = self
            .context
            .admit(CrudOp::Read, cancel)
            .await
            .map_err(|error| DispatchError::ImportRead {
                source: Box::new(error),
            })?;
        match self.refresh(&candidate, cancel).await {
            Ok(Some(state)) => {
                tracing::debug!(id = %state.id, "resource imported");
                Ok(state)
            }
            Ok(None) => Err(DispatchError::InvalidImport {
                message: format!(
                    "object '{}' does not exist (read hook exited with code 22)",
                    candidate.id
                ),
            }),
            Err(error) => Err(DispatchError::ImportRead {
                source: Box::new(error),
            }),
        }
    }

    /// True when the planned change can only be realised by delete + create:
    /// the input changed and no update hook is configured.
    pub fn requires_replace(prior: &ResourceState, plan: &ResourcePlan) -> bool {
        !plan.hooks.is_configured(CrudOp::Update) && prior.input != plan.input
    }

    /// Moves a resource from `prior` (absent for a new object) to `plan`.
    ///
    /// An unchanged input never invokes the update hook; only the hook set is
    /// refreshed in state.
    pub async fn apply(
        &self,
        prior: Option<&ResourceState>,
        plan: &ResourcePlan,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, DispatchError> {
        let Some(prior) = prior else {
            return self.create(plan, cancel).await.map(ApplyOutcome::Created);
        };
        if prior.input == plan.input {
            tracing::debug!(id = %prior.id, "input unchanged, skipping update");
            return Ok(ApplyOutcome::Unchanged(ResourceState {
                hooks: plan.hooks.clone(),
                ..prior.clone()
            }));
        }
        if Self::requires_replace(prior, plan) {
            tracing::debug!(
                id = %prior.id,
                "update hook not provided and input changed, forcing replacement"
            );
            self.delete(prior, cancel).await?;
            return self.create(plan, cancel).await.map(ApplyOutcome::Replaced);
        }
        self.update(prior, plan, cancel)
            .await
            .map(ApplyOutcome::Updated)
    }

    /// Runs the read hook against `state`; `None` means the object is gone.
    async fn refresh(
        &self,
        state: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<Option<ResourceState>, DispatchError> {
        let codec = self.context.codec();
        let payload = self.persisted_payload(state);
        let outcome = self
            .context
            .run_crud_script(&state.hooks, CrudOp::Read, &payload, cancel)
            .await?;
        let (output, _) = match outcome {
            ScriptOutcome::Gone(_) => return Ok(None),
            other => other.into_output(CrudOp::Read, &self.context, &payload)?,
        };
        let input = codec.merge_input_with_output(&state.input, &output);
        let output = codec.decode_hinted(&Value::Object(output), Some(&state.output));
        Ok(Some(ResourceState {
            id: state.id.clone(),
            hooks: state.hooks.clone(),
            input,
            output,
        }))
    }

    fn persisted_payload(&self, state: &ResourceState) -> ExecutionPayload {
        let codec = self.context.codec();
        ExecutionPayload::new()
            .with_id(state.id.clone())
            .with_input(self.context.config().layer_defaults(codec.encode(&state.input)))
            .with_output(codec.encode(&state.output))
    }

    /// Builds the dispatched input: defaults, then the explicit input, then
    /// the write-only overlay.
    fn payload_input(
        &self,
        op: CrudOp,
        input: &DynamicValue,
        write_only: Option<&str>,
    ) -> Result<Value, DispatchError> {
        let layered = self
            .context
            .config()
            .layer_defaults(self.context.codec().encode(input));
        let Some(raw) = write_only.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(layered);
        };
        let overlay = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(overlay)) => overlay,
            Ok(other) => {
                return Err(DispatchError::InvalidWriteOnlyInput {
                    op,
                    message: format!("must be a JSON object, got {}", json_kind(&other)),
                })
            }
            Err(error) => {
                return Err(DispatchError::InvalidWriteOnlyInput {
                    op,
                    message: format!("is not valid JSON: {error}"),
                })
            }
        };
        match layered {
            Value::Object(mut fields) => {
                fields.extend(overlay);
                Ok(Value::Object(fields))
            }
            Value::Null => Ok(Value::Object(overlay)),
            other => Err(DispatchError::InvalidWriteOnlyInput {
                op,
                message: format!("cannot be merged into a {} input", json_kind(&other)),
            }),
        }
    }
}

/// Accepts a string id verbatim and stringifies any other non-null scalar.
/// Only strings and numbers identify an object.
fn id_from_json(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(id) => id.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}
