#![forbid(unsafe_code)]
//! vexec-core: datums, columns, chunks, schemas and configuration.
//!
//! Pure data types shared by every other crate in the workspace. No threads,
//! no IO and no operator logic live here.

pub mod budget;
pub mod chunk;
pub mod config;
pub mod error;
pub mod prelude;
pub mod schema;
pub mod types;
