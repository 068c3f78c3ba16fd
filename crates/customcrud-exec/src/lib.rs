//! Process execution primitives for customcrud hooks.
//!
//! Spawns one hook process per invocation, exchanges JSON over stdio, bounds
//! how many hooks run at once, and masks secrets out of everything that ends up
//! in logs or diagnostics.

pub mod cancellation;
pub mod engine;
pub mod error;
pub mod gate;
pub mod masking;
pub mod payload;

pub use cancellation::CancellationToken;
pub use engine::{execute, EXIT_CODE_SIGNALLED};
pub use error::ExecError;
pub use gate::{ConcurrencyGate, GatePermit};
pub use masking::{SensitiveMasker, REDACTION_MARKER};
pub use payload::{ExecutionPayload, ExecutionResult};
