//! Lifecycle orchestration for script-backed objects.
//!
//! A [`Provider`] is built once from [`ProviderSettings`] and hands out
//! handlers for persistent resources, read-only data sources and
//! lease-style objects. Every handler phase selects a hook command, builds the
//! JSON payload, runs the hook under the shared concurrency gate and folds the
//! result back into state.

pub mod config;
mod dispatch;
pub mod data_source;
pub mod error;
pub mod hooks;
pub mod lease;
pub mod resource;

use std::sync::Arc;

pub use config::{ConfigError, ProviderConfig, ProviderSettings};
pub use data_source::{DataSourceConfig, DataSourceHandler, DataSourceState};
pub use dispatch::ProviderContext;
pub use error::{DispatchError, FailureReport};
pub use hooks::{CrudHooks, CrudOp, HookError, ObjectKind};
pub use lease::{
    HookRun, LeaseConfig, LeaseHandler, LeaseState, MemoryPrivateState, PrivateState,
    PrivateStateError, PRIVATE_KEY_HOOKS, PRIVATE_KEY_INPUT, PRIVATE_KEY_OUTPUT,
};
pub use resource::{ApplyOutcome, ReadOutcome, ResourceHandler, ResourcePlan, ResourceState};

/// Entry point owning the frozen configuration and the concurrency gate.
#[derive(Debug, Clone)]
pub struct Provider {
    context: Arc<ProviderContext>,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            context: Arc::new(ProviderContext::new(config)),
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(ProviderConfig::from_settings(settings)?))
    }

    pub fn config(&self) -> &ProviderConfig {
        self.context.config()
    }

    pub fn context(&self) -> &Arc<ProviderContext> {
        &self.context
    }

    pub fn resource(&self) -> ResourceHandler {
        ResourceHandler::new(Arc::clone(&self.context))
    }

    pub fn data_source(&self) -> DataSourceHandler {
        DataSourceHandler::new(Arc::clone(&self.context))
    }

    pub fn lease(&self) -> LeaseHandler {
        LeaseHandler::new(Arc::clone(&self.context))
    }
}
