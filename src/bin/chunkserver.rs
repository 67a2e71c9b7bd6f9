//! Chunk-server process entry point (spec.md §6): ensures the storage
//! directory exists, registers with the master, then serves RPCs.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use gfs::ConfigArgs;
use gfs_chunkserver::{ChunkServer, ChunkStore};

#[derive(Debug, Parser)]
#[command(about = "GFS-style chunk server: local chunk storage and the write/append/read path")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    #[arg(long)]
    port: u16,

    #[arg(long)]
    master: String,

    /// Directory chunk files are stored in. Defaults to `temp/ck<port>`.
    #[arg(long)]
    path: Option<String>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let addr: SocketAddr = format!("{}:{}", cli.ip, cli.port).parse()?;
    let base_dir = cli.path.unwrap_or_else(|| format!("temp/ck{}", cli.port));

    let store = ChunkStore::open(&base_dir)?;
    let server = Arc::new(ChunkServer::new(addr.to_string(), cli.master, cli.config.into(), store));

    server.register_with_master().await?;
    log::info!("chunk server {addr} registered with master, storing chunks in {base_dir}");

    let router = Arc::new(gfs_chunkserver::service::build_router(server));
    gfs_tools::rpc::serve(addr, router).await
}
