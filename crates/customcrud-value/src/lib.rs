//! Dynamic value model and JSON codec for customcrud hooks.
//!
//! Hosts the tagged `DynamicValue` type exposed by the configuration language
//! and the bidirectional conversion to and from generic JSON, including
//! precision-preserving numbers and collection-shape inference.

pub mod codec;
pub mod number;
pub mod value;

pub use codec::{NumberMode, ValueCodec};
pub use number::Number;
pub use value::{DynamicValue, ValueType};
