//! Periodic liveness probe and re-replication driver (spec.md §4.7). Runs
//! as a background tokio task; never holds a manager mutex while making an
//! outbound RPC — addresses are snapshotted under the lock, then released
//! before probing (spec.md §9).

use std::sync::Arc;

use gfs_types::messages::{HeartbeatRequest, HeartbeatResponse, OrderChunkCopyRequest, ReportChunkRequest};
use gfs_types::{Address, GfsError};

use crate::master::Master;

/// Runs the heartbeat loop forever, sleeping `heartbeat_interval` between
/// ticks. Intended to be spawned with `tokio::spawn`.
pub async fn run(master: Arc<Master>) {
    let interval = master.config.heartbeat_interval();
    loop {
        tokio::time::sleep(interval).await;
        if let Err(err) = tick(&master).await {
            log::warn!("heartbeat tick failed: {err}");
        }
    }
}

async fn tick(master: &Master) -> anyhow::Result<()> {
    let active = master.chunks.active_servers();
    let delete_queue = master.chunks.take_delete_queue();

    let mut dead = Vec::new();
    let mut held_by: Vec<(Address, Vec<u64>)> = Vec::new();

    for address in &active {
        let request = HeartbeatRequest {
            chunks_to_delete: delete_queue.clone(),
        };
        match gfs_tools::rpc::call_rpc::<_, HeartbeatResponse>(address, "heartbeat", &request).await {
            Ok(resp) => held_by.push((address.clone(), resp.held_handles)),
            Err(GfsError::Transport(reason)) => {
                log::warn!("chunk server {address} unreachable, dropping: {reason}");
                dead.push(address.clone());
            }
            Err(err) => log::warn!("chunk server {address} heartbeat error: {err}"),
        }
    }

    // Reconcile reported holdings so a master restart re-learns locations
    // it lost (SPEC_FULL §4.12) without waiting for an explicit report_chunk.
    for (address, handles) in held_by {
        for handle in handles {
            master.chunks.set_chunk_location(handle, &address);
        }
    }

    let mut handles_to_rereplicate = Vec::new();
    for address in &dead {
        handles_to_rereplicate.extend(master.chunks.remove_server(address));
    }

    let replication_factor = master.chunks.replication_factor();
    for handle in handles_to_rereplicate {
        let (current, candidates) = master.chunks.replication_candidates(handle);
        if current.len() >= replication_factor {
            continue;
        }
        if master.chunks.active_server_count() < replication_factor {
            continue;
        }
        let Some(destination) = gfs_tools::rng::pick_one(&candidates) else {
            continue;
        };
        let Some(source) = gfs_tools::rng::pick_one(&current) else {
            continue;
        };

        let request = OrderChunkCopyRequest {
            peer: source.clone(),
            chunk_handle: handle,
        };
        match gfs_tools::rpc::call_rpc::<_, gfs_types::messages::GetChunkInfoResponse>(
            &destination,
            "order_chunk_copy_from_peer",
            &request,
        )
        .await
        {
            Ok(info) => {
                master.chunks.set_chunk_location(handle, &destination);
                let _ = master.report_chunk(&ReportChunkRequest {
                    chunk_handle: handle,
                    address: destination.clone(),
                    length: info.length,
                    held_handles: vec![handle],
                });
            }
            Err(err) => log::warn!("re-replication of {handle} to {destination} failed: {err}"),
        }
    }

    Ok(())
}

/// Exposed for tests: a single synchronous tick without sleeping.
pub async fn tick_once(master: &Master) -> anyhow::Result<()> {
    tick(master).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gfs_chunkserver::{ChunkServer, ChunkStore};
    use gfs_types::messages::{PushDataRequest, WriteRequest, WriteResponse};

    use super::*;

    /// Binds an ephemeral port, serves a chunk server's router on it, and
    /// returns the address once it answers connections, plus the task
    /// handle so a test can `.abort()` it to simulate a dead server.
    async fn spawn_chunkserver(
        master_addr: &Address,
        config: gfs_types::Config,
    ) -> (tempfile::TempDir, Arc<ChunkServer>, Address, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let address = addr.to_string();

        let server = Arc::new(ChunkServer::new(address.clone(), master_addr.clone(), config, store));
        let router = Arc::new(gfs_chunkserver::service::build_router(server.clone()));
        let handle = tokio::spawn(gfs_tools::rpc::serve(addr, router));

        for _ in 0..100 {
            if tokio::net::TcpStream::connect(&address).await.is_ok() {
                return (dir, server, address, handle);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("chunk server at {address} never came up");
    }

    fn master() -> (tempfile::TempDir, Master) {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("oplog");
        let config = gfs_types::Config {
            replication_factor: 2,
            ..gfs_types::Config::default()
        };
        let master = Master::open(&log_path, config).unwrap();
        (dir, master)
    }

    #[tokio::test]
    async fn tick_once_is_harmless_with_no_active_servers() {
        let (_dir, master) = master();
        tick_once(&master).await.unwrap();
    }

    #[tokio::test]
    async fn tick_once_rereplicates_off_a_dead_server() {
        let (_dir, master) = master();
        let master_addr = "127.0.0.1:1".to_string();

        let (_d_a, _server_a, addr_a, handle_a) = spawn_chunkserver(&master_addr, master.config).await;
        let (_d_b, _server_b, addr_b, handle_b) = spawn_chunkserver(&master_addr, master.config).await;
        let (_d_c, _server_c, addr_c, _handle_c) = spawn_chunkserver(&master_addr, master.config).await;

        master.notify_master(&addr_a).unwrap();
        master.notify_master(&addr_b).unwrap();
        master.notify_master(&addr_c).unwrap();

        master.create("/f").unwrap();
        let added = master.add_chunk("/f", 0).unwrap();
        assert_eq!(added.replicas.len(), 2);

        let dead_addr = added.replicas[0].clone();
        let survivor_addr = added.replicas[1].clone();
        let dead_handle = if dead_addr == addr_a { handle_a } else { handle_b };

        gfs_tools::rpc::call_rpc::<_, ()>(
            &dead_addr,
            "push_data",
            &PushDataRequest {
                client_id: 1,
                timestamp: 1,
                data: b"payload".to_vec(),
            },
        )
        .await
        .unwrap();
        gfs_tools::rpc::call_rpc::<_, ()>(
            &survivor_addr,
            "push_data",
            &PushDataRequest {
                client_id: 1,
                timestamp: 1,
                data: b"payload".to_vec(),
            },
        )
        .await
        .unwrap();
        gfs_tools::rpc::call_rpc::<_, WriteResponse>(
            &survivor_addr,
            "write",
            &WriteRequest {
                client_id: 1,
                timestamp: 1,
                path: "/f".to_string(),
                chunk_index: 0,
                chunk_handle: added.handle,
                offset: 0,
                replicas: vec![dead_addr.clone(), survivor_addr.clone()],
            },
        )
        .await
        .unwrap();

        // Kill the chosen-dead server's listener for real, so the heartbeat
        // probe fails with a genuine transport error.
        dead_handle.abort();
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(&dead_addr).await.is_err() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        tick_once(&master).await.unwrap();

        assert!(!master.chunks.active_servers().contains(&dead_addr));
        let (current, _) = master.chunks.replication_candidates(added.handle);
        assert!(current.contains(&survivor_addr));
        assert!(!current.contains(&dead_addr));
        assert_eq!(current.len(), 2);
    }

    #[tokio::test]
    async fn tick_once_reconciles_held_handles_into_location_map() {
        let (_dir, master) = master();
        let master_addr = "127.0.0.1:1".to_string();

        let (_d, server, addr, _handle) = spawn_chunkserver(&master_addr, master.config).await;
        master.notify_master(&addr).unwrap();

        master.create("/f").unwrap();
        let added = master.add_chunk("/f", 0).unwrap();
        assert_eq!(added.replicas, vec![addr.clone()]);

        // Simulate the server already holding a second handle the master
        // doesn't yet know about (e.g. after a master restart).
        server.push_data(2, 2, b"x".to_vec());
        server
            .store
            .commit_write(2, 2, "/g", 0, 999, 0)
            .unwrap();

        tick_once(&master).await.unwrap();

        let (current, _) = master.chunks.replication_candidates(999);
        assert_eq!(current, vec![addr]);
    }
}
