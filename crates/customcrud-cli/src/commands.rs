use std::path::Path;

use anyhow::{bail, Context, Result};
use customcrud_exec::CancellationToken;
use customcrud_provider::{
    ApplyOutcome, CrudHooks, DataSourceConfig, HookRun, LeaseConfig, MemoryPrivateState,
    ObjectKind, Provider, ReadOutcome, ResourcePlan, ResourceState,
};
use customcrud_value::ValueCodec;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    cli_args::CliCommand,
    state_store::{load_json, load_optional_json, remove_if_exists, save_json},
};

/// On-disk shape shared by resource, data source and lease configuration files.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectConfigFile {
    hooks: CrudHooks,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    write_only_input: Option<Value>,
}

impl ObjectConfigFile {
    fn load(path: &Path, kind: ObjectKind) -> Result<Self> {
        let config: Self = load_json(path)?;
        config
            .hooks
            .validate(kind)
            .with_context(|| format!("invalid hooks in {}", path.display()))?;
        if kind != ObjectKind::Resource && config.write_only_input.is_some() {
            bail!(
                "{}: write_only_input is only supported for resources",
                path.display()
            );
        }
        Ok(config)
    }

    /// A string is passed through verbatim; any other JSON is re-encoded.
    fn write_only_input(&self) -> Option<String> {
        match &self.write_only_input {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(raw.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

pub(crate) async fn run_command(
    provider: &Provider,
    command: CliCommand,
    cancel: &CancellationToken,
) -> Result<Value> {
    let codec = provider.config().codec();
    match command {
        CliCommand::Apply { config, state } => apply(provider, &config, &state, cancel).await,
        CliCommand::Refresh { state } => {
            let prior = load_state(&state)?;
            match provider.resource().read(&prior, cancel).await? {
                ReadOutcome::Present(refreshed) => {
                    save_json(&state, &refreshed)?;
                    Ok(render_resource(codec, "refreshed", &refreshed))
                }
                ReadOutcome::Removed => {
                    remove_if_exists(&state)?;
                    Ok(json!({"action": "removed", "id": prior.id}))
                }
            }
        }
        CliCommand::Destroy { state } => {
            let prior = load_state(&state)?;
            provider.resource().delete(&prior, cancel).await?;
            remove_if_exists(&state)?;
            Ok(json!({"action": "deleted", "id": prior.id}))
        }
        CliCommand::Import { spec, state } => {
            let imported = provider.resource().import(&spec, cancel).await?;
            save_json(&state, &imported)?;
            Ok(render_resource(codec, "imported", &imported))
        }
        CliCommand::Data { config } => {
            let file = ObjectConfigFile::load(&config, ObjectKind::DataSource)?;
            let data = DataSourceConfig {
                hooks: file.hooks,
                input: codec.decode(&file.input),
            };
            let state = provider.data_source().read(&data, cancel).await?;
            Ok(json!({
                "input": codec.encode(&state.input),
                "output": codec.encode(&state.output),
            }))
        }
        CliCommand::Open { config, private } => {
            let file = ObjectConfigFile::load(&config, ObjectKind::Lease)?;
            let lease = LeaseConfig {
                hooks: file.hooks,
                input: codec.decode(&file.input),
            };
            let mut recorded = MemoryPrivateState::new();
            let state = provider.lease().open(&lease, &mut recorded, cancel).await?;
            save_json(&private, &recorded)?;
            Ok(json!({
                "input": codec.encode(&state.input),
                "output": codec.encode(&state.output),
            }))
        }
        CliCommand::Renew { private } => {
            let recorded: MemoryPrivateState = load_json(&private)?;
            let run = provider.lease().renew(&recorded, cancel).await?;
            Ok(json!({"renew": hook_run_label(run)}))
        }
        CliCommand::Close { private } => {
            let recorded: MemoryPrivateState =
                load_optional_json(&private)?.unwrap_or_default();
            let run = provider.lease().close(&recorded, cancel).await?;
            remove_if_exists(&private)?;
            Ok(json!({"close": hook_run_label(run)}))
        }
    }
}

async fn apply(
    provider: &Provider,
    config: &Path,
    state: &Path,
    cancel: &CancellationToken,
) -> Result<Value> {
    let codec = provider.config().codec();
    let file = ObjectConfigFile::load(config, ObjectKind::Resource)?;
    let prior: Option<ResourceState> = load_optional_json(state)?;
    let plan = ResourcePlan {
        input: codec.decode_hinted(&file.input, prior.as_ref().map(|prior| &prior.input)),
        write_only_input: file.write_only_input(),
        hooks: file.hooks,
    };

    let outcome: ApplyOutcome = provider.resource().apply(prior.as_ref(), &plan, cancel).await?;
    let action = outcome.action();
    let next = outcome.into_state();
    save_json(state, &next)?;
    Ok(render_resource(codec, action, &next))
}

fn load_state(path: &Path) -> Result<ResourceState> {
    load_optional_json(path)?
        .with_context(|| format!("no resource state at {}", path.display()))
}

fn render_resource(codec: ValueCodec, action: &str, state: &ResourceState) -> Value {
    json!({
        "action": action,
        "id": state.id,
        "input": codec.encode(&state.input),
        "output": codec.encode(&state.output),
    })
}

fn hook_run_label(run: HookRun) -> &'static str {
    match run {
        HookRun::Ran => "ran",
        HookRun::Skipped => "skipped",
    }
}
