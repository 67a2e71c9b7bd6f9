//! Client CLI: a thin driver over `gfs_client::GfsClient` for the
//! operations named in spec.md §6 (library-style; this binary just exposes
//! them as subcommands for manual testing and the end-to-end scenarios in
//! spec.md §8).

use clap::{Parser, Subcommand};
use gfs::ConfigArgs;
use gfs_client::GfsClient;

#[derive(Debug, Parser)]
#[command(about = "GFS-style client: create/read/write/append against a running master")]
struct Cli {
    #[arg(long)]
    master: String,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Create { path: String },
    CreateDir { path: String },
    Delete { path: String },
    List { path: String },
    GetFileLength { path: String },
    Read {
        path: String,
        offset: u64,
        /// Bytes to read. Omit and pass `--to-end` instead to read through
        /// the current end of file.
        #[arg(required_unless_present = "to_end")]
        length: Option<u64>,
        #[arg(long)]
        to_end: bool,
    },
    Write { path: String, offset: u64, data: String },
    Append { path: String, data: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let client = GfsClient::connect(cli.master, cli.config.into()).await?;

    match cli.command {
        Command::Create { path } => client.create(&path).await?,
        Command::CreateDir { path } => client.create_dir(&path).await?,
        Command::Delete { path } => client.delete(&path).await?,
        Command::List { path } => {
            for entry in client.list(&path).await? {
                println!("{}\t{}\t{}", entry.path, if entry.is_dir { "dir" } else { "file" }, entry.length);
            }
        }
        Command::GetFileLength { path } => println!("{}", client.get_file_length(&path).await?),
        Command::Read { path, offset, length, to_end } => {
            let length = if to_end {
                client.get_file_length(&path).await?.saturating_sub(offset)
            } else {
                length.expect("clap enforces length unless --to-end")
            };
            let data = client.read(&path, offset, length).await?;
            use std::io::Write;
            std::io::stdout().write_all(&data)?;
        }
        Command::Write { path, offset, data } => client.write(&path, offset, data.as_bytes()).await?,
        Command::Append { path, data } => {
            let offset = client.append(&path, data.as_bytes()).await?;
            println!("{offset}");
        }
    }

    Ok(())
}
