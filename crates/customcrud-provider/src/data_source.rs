use std::sync::Arc;

use customcrud_exec::{CancellationToken, ExecutionPayload};
use customcrud_value::DynamicValue;
use serde::{Deserialize, Serialize};

use crate::{
    dispatch::ProviderContext,
    error::DispatchError,
    hooks::{CrudHooks, CrudOp},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSourceConfig {
    pub hooks: CrudHooks,
    pub input: DynamicValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceState {
    pub input: DynamicValue,
    pub output: DynamicValue,
}

/// Read-only lookups backed by a single read hook.
#[derive(Debug, Clone)]
pub struct DataSourceHandler {
    context: Arc<ProviderContext>,
}

impl DataSourceHandler {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Self {
        Self { context }
    }

    #[tracing::instrument(
        name = "customcrud_provider.data_source.read",
        skip_all,
        fields(op = "read")
    )]
    pub async fn read(
        &self,
        config: &DataSourceConfig,
        cancel: &CancellationToken,
    ) -> Result<DataSourceState, DispatchError> {
        let _permit = self.context.admit(CrudOp::Read, cancel).await?;
        let codec = self.context.codec();
        let payload = ExecutionPayload::new().with_input(
            self.context
                .config()
                .layer_defaults(codec.encode(&config.input)),
        );
        let (output, _) = self
            .context
            .run_crud_script(&config.hooks, CrudOp::Read, &payload, cancel)
            .await?
            .into_output(CrudOp::Read, &self.context, &payload)?;
        Ok(DataSourceState {
            input: config.input.clone(),
            output: codec.decode_object(&output),
        })
    }
}
