//! Shared types used by the master, the chunk server and the client:
//! error kinds, system configuration constants and RPC message shapes.

pub mod config;
pub mod error;
pub mod messages;

pub use config::Config;
pub use error::GfsError;

/// Unique, monotonically increasing, never-reused identifier for a chunk.
pub type ChunkHandle = u64;

/// Zero-based position of a chunk within its file.
pub type ChunkIndex = u64;

/// `host:port` address of a chunk server, as registered with the master.
pub type Address = String;

/// Identifies a client across push/commit RPCs: `(client_id, timestamp)`.
pub type DataId = (u64, u64);
