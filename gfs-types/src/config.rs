use serde::{Deserialize, Serialize};

/// System-wide tunables. Compile/startup-time configuration, never mutated
/// at runtime (§9 "global mutable state" design note).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Config {
    /// Maximum bytes a single chunk may contain.
    pub chunk_size: u64,
    /// Target replica count for a chunk at steady state.
    pub replication_factor: usize,
    /// Maximum bytes accepted by a single `append` call. Must be
    /// `<= chunk_size / 4`.
    pub append_size: u64,
    /// Seconds a primary lease remains valid once granted.
    pub lease_timeout_secs: u64,
    /// Seconds between master heartbeat probes of the active chunk-server set.
    pub heartbeat_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024 * 1024,
            replication_factor: 3,
            append_size: 16 * 1024 * 1024,
            lease_timeout_secs: 60,
            heartbeat_interval_secs: 5,
        }
    }
}

impl Config {
    pub fn lease_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// `chunk_index` a byte offset inside a file falls into.
    pub fn chunk_index_for_offset(&self, offset: u64) -> u64 {
        offset / self.chunk_size
    }

    /// Offset of a byte offset within its chunk.
    pub fn offset_in_chunk(&self, offset: u64) -> u64 {
        offset % self.chunk_size
    }
}
