//! Master process entry point (spec.md §6): binds an RPC listener, opens
//! the operation log, and runs the heartbeat/re-replication loop
//! alongside it.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use gfs::ConfigArgs;
use gfs_master::operation_log::default_log_path;
use gfs_master::{master::Master, service};

#[derive(Debug, Parser)]
#[command(about = "GFS-style master: namespace, chunk map, lease and re-replication authority")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    #[arg(long, default_value_t = 9001)]
    port: u16,

    /// Path to the operation log. Defaults to `master_meta_<ip>_<port>.log`
    /// in the working directory.
    #[arg(long)]
    log_path: Option<String>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let addr: SocketAddr = format!("{}:{}", cli.ip, cli.port).parse()?;
    let log_path = cli
        .log_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| default_log_path(&addr.to_string()));

    let master = Arc::new(Master::open(&log_path, cli.config.into())?);
    log::info!("master listening on {addr}, operation log at {log_path:?}");

    tokio::spawn(gfs_master::heartbeat::run(master.clone()));

    let router = Arc::new(service::build_router(master));
    gfs_tools::rpc::serve(addr, router).await
}
