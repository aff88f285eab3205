//! Execution configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default hard ceiling on rows per chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Hard per-chunk row ceiling. Every `required_rows` is clamped to this.
    pub max_chunk_size: usize,

    /// Worker threads for parallel projection; 0 selects the serial path.
    pub projection_concurrency: usize,

    /// Memory quota (bytes) shared by every materializing operator of a query.
    pub mem_quota_bytes: usize,

    /// Largest run of equal-key inner rows a merge join may buffer.
    pub max_join_group_rows: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            projection_concurrency: 0,
            mem_quota_bytes: 512 * 1024 * 1024, // 512 MiB default
            max_join_group_rows: 1 << 20,
        }
    }
}

impl ExecConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `VEXEC_MAX_CHUNK_SIZE`: rows per chunk
    /// - `VEXEC_PROJECTION_CONCURRENCY`: projection worker threads
    /// - `VEXEC_MEM_QUOTA_BYTES`: memory quota in bytes
    /// - `VEXEC_MAX_JOIN_GROUP_ROWS`: merge join inner group cap
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("VEXEC_MAX_CHUNK_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_chunk_size = v;
            }
        }

        if let Ok(s) = std::env::var("VEXEC_PROJECTION_CONCURRENCY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.projection_concurrency = v;
            }
        }

        if let Ok(s) = std::env::var("VEXEC_MEM_QUOTA_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.mem_quota_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("VEXEC_MAX_JOIN_GROUP_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_join_group_rows = v;
            }
        }

        cfg
    }

    pub fn with_max_chunk_size(mut self, rows: usize) -> Self {
        self.max_chunk_size = rows;
        self
    }

    pub fn with_projection_concurrency(mut self, workers: usize) -> Self {
        self.projection_concurrency = workers;
        self
    }

    pub fn with_mem_quota_bytes(mut self, bytes: usize) -> Self {
        self.mem_quota_bytes = bytes;
        self
    }

    pub fn with_max_join_group_rows(mut self, rows: usize) -> Self {
        self.max_join_group_rows = rows;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::Config("max_chunk_size must be positive".into()));
        }
        if self.mem_quota_bytes == 0 {
            return Err(Error::Config("mem_quota_bytes must be positive".into()));
        }
        if self.max_join_group_rows == 0 {
            return Err(Error::Config("max_join_group_rows must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ExecConfig::default();
        assert_eq!(cfg.max_chunk_size, 1024);
        assert_eq!(cfg.projection_concurrency, 0);
        cfg.validate().expect("default config");
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let cfg = ExecConfig::default().with_max_chunk_size(0);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ExecConfig::default().with_projection_concurrency(3);
        let text = serde_json::to_string(&cfg).expect("serialize");
        let back: ExecConfig = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, cfg);
    }
}
