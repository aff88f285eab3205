//! Convenient re-exports for downstream crates.

pub use crate::chunk::Chunk;
pub use crate::config::ExecConfig;
pub use crate::error::{Error, Result};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Column, Datum};
