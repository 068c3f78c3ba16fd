use customcrud_exec::{
    execute, CancellationToken, ConcurrencyGate, ExecError, ExecutionPayload, ExecutionResult,
    GatePermit,
};
use customcrud_value::ValueCodec;
use serde_json::{Map, Value};

use crate::{
    config::ProviderConfig,
    error::{DispatchError, FailureReport},
    hooks::{CrudHooks, CrudOp},
};

/// Exit code a read hook uses to say the object no longer exists.
pub(crate) const EXIT_CODE_GONE: i32 = 22;

/// State shared by every handler of one provider instance.
#[derive(Debug)]
pub struct ProviderContext {
    config: ProviderConfig,
    gate: ConcurrencyGate,
    codec: ValueCodec,
}

impl ProviderContext {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            gate: ConcurrencyGate::new(config.parallelism()),
            codec: config.codec(),
            config,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn codec(&self) -> ValueCodec {
        self.codec
    }

    /// Blocks until the phase may run; the permit covers the whole phase.
    ///
    /// Cancellation while queued fails the phase before anything is spawned.
    pub(crate) async fn admit(
        &self,
        op: CrudOp,
        cancel: &CancellationToken,
    ) -> Result<GatePermit, DispatchError> {
        match self.gate.acquire_or_cancel(cancel).await {
            Some(permit) => Ok(permit),
            None => {
                tracing::debug!(op = op.as_str(), "cancelled while waiting for a gate permit");
                Err(DispatchError::Cancelled {
                    op,
                    report: FailureReport::from_payload(String::new()),
                })
            }
        }
    }

    /// Runs the hook for `op` and classifies its outcome.
    ///
    /// Exit code 22 is only meaningful to a read; every other non-zero exit is
    /// a script failure. A hook that prints nothing is an error unless the
    /// phase does not consume output.
    pub(crate) async fn run_crud_script(
        &self,
        hooks: &CrudHooks,
        op: CrudOp,
        payload: &ExecutionPayload,
        cancel: &CancellationToken,
    ) -> Result<ScriptOutcome, DispatchError> {
        let argv = hooks
            .resolve(op)
            .map_err(|source| DispatchError::Configuration { op, source })?;
        tracing::debug!(op = op.as_str(), id = %payload.id, "dispatching hook");

        let result = match execute(&argv, payload, self.config.masker(), cancel).await {
            Ok(result) => result,
            Err(error) => {
                if op == CrudOp::Read && error.exit_code() == Some(EXIT_CODE_GONE) {
                    if let ExecError::NonZeroExit { .. } = error {
                        tracing::debug!(id = %payload.id, "read hook reported object gone");
                        return Ok(ScriptOutcome::Gone(error));
                    }
                }
                return Err(DispatchError::from_exec(op, error, self.masked_payload(payload)));
            }
        };

        match result.result.clone() {
            Some(output) => Ok(ScriptOutcome::Output {
                output,
                execution: result,
            }),
            None if op.tolerates_empty_output() => Ok(ScriptOutcome::NoOutput),
            None => Err(DispatchError::EmptyOutput {
                op,
                report: FailureReport::from_result(&result),
            }),
        }
    }

    pub(crate) fn masked_payload(&self, payload: &ExecutionPayload) -> String {
        serde_json::to_string(payload)
            .map(|raw| self.config.masker().mask_json(&raw))
            .unwrap_or_default()
    }
}

/// What a successfully dispatched hook produced.
#[derive(Debug)]
pub(crate) enum ScriptOutcome {
    Output {
        output: Map<String, Value>,
        execution: ExecutionResult,
    },
    NoOutput,
    /// Read exited with code 22.
    Gone(ExecError),
}

impl ScriptOutcome {
    /// Treats "gone" as an ordinary failure for phases that cannot remove state.
    pub(crate) fn into_output(
        self,
        op: CrudOp,
        context: &ProviderContext,
        payload: &ExecutionPayload,
    ) -> Result<(Map<String, Value>, ExecutionResult), DispatchError> {
        match self {
            Self::Output { output, execution } => Ok((output, execution)),
            Self::Gone(error) => Err(DispatchError::from_exec(
                op,
                error,
                context.masked_payload(payload),
            )),
            Self::NoOutput => Err(DispatchError::EmptyOutput {
                op,
                report: FailureReport::from_payload(
                    context.masked_payload(payload),
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use customcrud_exec::{CancellationToken, ExecutionPayload};
    use serde_json::json;

    use super::{ProviderContext, ScriptOutcome};
    use crate::{
        config::{ProviderConfig, ProviderSettings},
        error::DispatchError,
        hooks::{CrudHooks, CrudOp},
    };

    fn context() -> ProviderContext {
        ProviderContext::new(
            ProviderConfig::from_settings(&ProviderSettings {
                sensitive_default_inputs: Some(json!({"token": "tok-9"})),
                ..ProviderSettings::default()
            })
            .expect("config"),
        )
    }

    fn hooks(op: CrudOp, script: &str) -> CrudHooks {
        CrudHooks::default().with_command(op, format!("sh -c '{script}'"))
    }

    #[tokio::test]
    async fn unit_read_exit_22_is_gone_not_error() {
        let outcome = context()
            .run_crud_script(
                &hooks(CrudOp::Read, "exit 22"),
                CrudOp::Read,
                &ExecutionPayload::new().with_id("x"),
                &CancellationToken::new(),
            )
            .await
            .expect("gone is not an error");
        assert!(matches!(outcome, ScriptOutcome::Gone(_)));
    }

    #[tokio::test]
    async fn unit_exit_22_outside_read_is_a_failure() {
        let error = context()
            .run_crud_script(
                &hooks(CrudOp::Update, "exit 22"),
                CrudOp::Update,
                &ExecutionPayload::new(),
                &CancellationToken::new(),
            )
            .await
            .expect_err("update failure");
        assert_eq!(error.exit_code(), Some(22));
        assert!(error.to_string().starts_with("Update Script Failed"));
    }

    #[tokio::test]
    async fn unit_empty_output_depends_on_phase() {
        let context = context();
        let payload = ExecutionPayload::new();
        let cancel = CancellationToken::new();
        let deleted = context
            .run_crud_script(&hooks(CrudOp::Delete, "true"), CrudOp::Delete, &payload, &cancel)
            .await
            .expect("delete tolerates nil output");
        assert!(matches!(deleted, ScriptOutcome::NoOutput));

        let error = context
            .run_crud_script(&hooks(CrudOp::Read, "true"), CrudOp::Read, &payload, &cancel)
            .await
            .expect_err("read requires output");
        assert!(matches!(error, DispatchError::EmptyOutput { .. }));
        assert!(error.to_string().contains("read script returned nil output"));
    }

    #[tokio::test]
    async fn unit_blank_hook_is_configuration_error_without_spawn() {
        let error = context()
            .run_crud_script(
                &CrudHooks::default(),
                CrudOp::Create,
                &ExecutionPayload::new(),
                &CancellationToken::new(),
            )
            .await
            .expect_err("missing hook");
        assert!(matches!(error, DispatchError::Configuration { .. }));
    }

    #[tokio::test]
    async fn functional_failure_report_is_masked() {
        let error = context()
            .run_crud_script(
                &hooks(CrudOp::Create, "cat >&2; exit 1"),
                CrudOp::Create,
                &ExecutionPayload::new().with_input(json!({"token": "tok-9", "name": "a"})),
                &CancellationToken::new(),
            )
            .await
            .expect_err("create failure");
        let message = error.to_string();
        assert!(!message.contains("tok-9"), "{message}");
        assert!(message.contains(r#"Input Payload: {"input":{"name":"a","token":"***"}}"#));
        assert!(message.contains("Exit Code: 1"));
    }
}
