//! Glue crate: shared CLI argument definitions for the three binaries
//! (master, chunk server, client demo). The actual subsystems live in
//! `gfs-master`, `gfs-chunkserver` and `gfs-client`.

use clap::Args;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Maximum bytes a single chunk may contain.
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    pub chunk_size: u64,

    /// Target replica count for a chunk at steady state.
    #[arg(long, default_value_t = 3)]
    pub replication_factor: usize,

    /// Maximum bytes accepted by a single append call.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub append_size: u64,

    /// Seconds a primary lease remains valid once granted.
    #[arg(long, default_value_t = 60)]
    pub lease_timeout_secs: u64,

    /// Seconds between master heartbeat probes of the active chunk-server set.
    #[arg(long, default_value_t = 5)]
    pub heartbeat_interval_secs: u64,
}

impl From<ConfigArgs> for gfs_types::Config {
    fn from(args: ConfigArgs) -> Self {
        gfs_types::Config {
            chunk_size: args.chunk_size,
            replication_factor: args.replication_factor,
            append_size: args.append_size,
            lease_timeout_secs: args.lease_timeout_secs,
            heartbeat_interval_secs: args.heartbeat_interval_secs,
        }
    }
}
