//! Chunk-server operations exposed over RPC (spec.md §4.5): the push/commit
//! write and append path, peer-to-peer chunk copy, and the heartbeat
//! responder that also runs requested garbage collection.

use std::sync::Arc;

use gfs_types::messages::{
    AppendOutcome, GetChunkInfoResponse, HeartbeatRequest, HeartbeatResponse, ReadResponse, WriteResponse,
};
use gfs_types::{Address, ChunkHandle, ChunkIndex, Config, GfsError};

use crate::store::ChunkStore;

pub struct ChunkServer {
    pub address: Address,
    pub master_addr: Address,
    pub config: Config,
    pub store: ChunkStore,
}

impl ChunkServer {
    pub fn new(address: Address, master_addr: Address, config: Config, store: ChunkStore) -> Self {
        Self {
            address,
            master_addr,
            config,
            store,
        }
    }

    pub fn push_data(&self, client_id: u64, timestamp: u64, data: Vec<u8>) {
        self.store.push_data(client_id, timestamp, data);
    }

    /// Called on the primary. Applies the staged write locally, then fans
    /// out `serialized_write` to every other replica (spec.md §4.5).
    pub async fn write(
        &self,
        client_id: u64,
        timestamp: u64,
        path: &str,
        chunk_index: ChunkIndex,
        chunk_handle: ChunkHandle,
        offset: u64,
        replicas: &[Address],
    ) -> Result<WriteResponse, GfsError> {
        let (written, length, grew) = self
            .store
            .commit_write(client_id, timestamp, path, chunk_index, chunk_handle, offset)?;

        if grew {
            self.report_chunk_length(chunk_handle, length).await;
        }

        for peer in replicas.iter().filter(|p| *p != &self.address) {
            self.serialized_write_to_peer(peer, client_id, timestamp, path, chunk_index, chunk_handle, offset)
                .await?;
        }

        Ok(WriteResponse { bytes_written: written })
    }

    /// Called by the primary on each secondary; identical body minus the
    /// fan-out.
    pub async fn serialized_write(
        &self,
        client_id: u64,
        timestamp: u64,
        path: &str,
        chunk_index: ChunkIndex,
        chunk_handle: ChunkHandle,
        offset: u64,
    ) -> Result<WriteResponse, GfsError> {
        let (written, length, grew) = self
            .store
            .commit_write(client_id, timestamp, path, chunk_index, chunk_handle, offset)?;
        if grew {
            self.report_chunk_length(chunk_handle, length).await;
        }
        Ok(WriteResponse { bytes_written: written })
    }

    async fn serialized_write_to_peer(
        &self,
        peer: &Address,
        client_id: u64,
        timestamp: u64,
        path: &str,
        chunk_index: ChunkIndex,
        chunk_handle: ChunkHandle,
        offset: u64,
    ) -> Result<(), GfsError> {
        let req = gfs_types::messages::WriteRequest {
            client_id,
            timestamp,
            path: path.to_string(),
            chunk_index,
            chunk_handle,
            offset,
            replicas: vec![],
        };
        gfs_tools::rpc::call_rpc::<_, WriteResponse>(peer, "serialized_write", &req).await?;
        Ok(())
    }

    /// Called on the primary. Picks the append offset as the current chunk
    /// length; refuses with `RetryNextChunk` if it would not fit, without
    /// consuming the staged bytes (the client retries against
    /// `chunk_index + 1`).
    pub async fn append(
        &self,
        client_id: u64,
        timestamp: u64,
        path: &str,
        chunk_index: ChunkIndex,
        chunk_handle: ChunkHandle,
        replicas: &[Address],
    ) -> Result<AppendOutcome, GfsError> {
        let committed = self
            .store
            .commit_append(client_id, timestamp, path, chunk_index, chunk_handle, self.config.chunk_size)?;

        let Some((offset, length)) = committed else {
            return Ok(AppendOutcome::RetryNextChunk);
        };

        self.report_chunk_length(chunk_handle, length).await;

        for peer in replicas.iter().filter(|p| *p != &self.address) {
            // Fanned out as a plain write at the offset the primary chose,
            // so every replica lands the record at the identical byte
            // range regardless of its own local chunk length.
            gfs_tools::rpc::call_rpc::<_, WriteResponse>(
                peer,
                "serialized_write",
                &gfs_types::messages::WriteRequest {
                    client_id,
                    timestamp,
                    path: path.to_string(),
                    chunk_index,
                    chunk_handle,
                    offset,
                    replicas: vec![],
                },
            )
            .await?;
        }

        Ok(AppendOutcome::Appended {
            offset: offset + chunk_index * self.config.chunk_size,
        })
    }

    pub fn read(&self, chunk_handle: ChunkHandle, offset: u64, length: u64) -> Result<ReadResponse, GfsError> {
        Ok(ReadResponse {
            data: self.store.read(chunk_handle, offset, length)?,
        })
    }

    pub fn get_chunk_info(&self, chunk_handle: ChunkHandle) -> Result<GetChunkInfoResponse, GfsError> {
        let info = self.store.chunk_info(chunk_handle)?;
        Ok(GetChunkInfoResponse {
            path: info.path,
            chunk_index: info.chunk_index,
            length: info.length,
        })
    }

    /// Fetches `chunk_handle` whole from `peer`, persists it locally, and
    /// reports the new holding to the master (spec.md §4.5, driven by the
    /// master's re-replication loop).
    pub async fn order_chunk_copy_from_peer(&self, peer: &Address, chunk_handle: ChunkHandle) -> Result<GetChunkInfoResponse, GfsError> {
        let info: GetChunkInfoResponse = gfs_tools::rpc::call_rpc(
            peer,
            "get_chunk_info_from_peer",
            &gfs_types::messages::GetChunkInfoRequest { chunk_handle },
        )
        .await?;

        let read: ReadResponse = gfs_tools::rpc::call_rpc(
            peer,
            "read",
            &gfs_types::messages::ReadRequest {
                chunk_handle,
                offset: 0,
                length: info.length,
            },
        )
        .await?;

        let length = self
            .store
            .store_whole(chunk_handle, &info.path, info.chunk_index, &read.data)?;

        self.report_chunk(chunk_handle, length).await;

        Ok(GetChunkInfoResponse {
            path: info.path,
            chunk_index: info.chunk_index,
            length,
        })
    }

    pub fn delete_bad_chunk(&self, chunk_handle: ChunkHandle) {
        self.store.delete_chunk(chunk_handle);
    }

    pub fn get_chunk_handles(&self) -> Vec<ChunkHandle> {
        self.store.held_handles()
    }

    /// Answers a master heartbeat probe: runs the requested garbage
    /// collection, then reports every chunk still held so the master can
    /// reconcile its replica map (SPEC_FULL §4.12).
    pub fn heartbeat(&self, req: &HeartbeatRequest) -> HeartbeatResponse {
        for handle in &req.chunks_to_delete {
            self.store.delete_chunk(*handle);
        }
        HeartbeatResponse {
            held_handles: self.store.held_handles(),
        }
    }

    async fn report_chunk_length(&self, chunk_handle: ChunkHandle, length: u64) {
        self.report_chunk(chunk_handle, length).await;
    }

    async fn report_chunk(&self, chunk_handle: ChunkHandle, length: u64) {
        let req = gfs_types::messages::ReportChunkRequest {
            chunk_handle,
            address: self.address.clone(),
            length,
            held_handles: vec![],
        };
        if let Err(err) = gfs_tools::rpc::call_rpc::<_, ()>(&self.master_addr, "report_chunk", &req).await {
            log::warn!("report_chunk({chunk_handle}) to master failed: {err}");
        }
    }

    /// Registers this server's address with the master. Called once at
    /// startup, after the storage directory is confirmed to exist
    /// (spec.md §6).
    pub async fn register_with_master(&self) -> Result<(), GfsError> {
        gfs_tools::rpc::call_rpc::<_, ()>(
            &self.master_addr,
            "notify_master",
            &gfs_types::messages::NotifyMasterRequest {
                address: self.address.clone(),
            },
        )
        .await
    }
}

pub type SharedChunkServer = Arc<ChunkServer>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds an ephemeral port, serves `server`'s router on it, and returns
    /// the address once it answers connections.
    async fn spawn(server: Arc<ChunkServer>) -> Address {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let router = Arc::new(crate::service::build_router(server));
        tokio::spawn(gfs_tools::rpc::serve(addr, router));

        let address = addr.to_string();
        for _ in 0..100 {
            if tokio::net::TcpStream::connect(&address).await.is_ok() {
                return address;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("chunk server at {address} never came up");
    }

    fn store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn write_fans_out_to_replicas_minus_self() {
        let (_d1, store1) = store();
        let (_d2, store2) = store();

        let secondary = Arc::new(ChunkServer::new(
            "secondary".to_string(),
            "127.0.0.1:1".to_string(),
            Config::default(),
            store2,
        ));
        let secondary_addr = spawn(secondary.clone()).await;

        let primary = ChunkServer::new("primary".to_string(), "127.0.0.1:1".to_string(), Config::default(), store1);
        let replicas = vec!["primary".to_string(), secondary_addr];

        primary.push_data(1, 1, b"hello".to_vec());
        secondary.push_data(1, 1, b"hello".to_vec());

        let resp = primary.write(1, 1, "/f", 0, 42, 0, &replicas).await.unwrap();
        assert_eq!(resp.bytes_written, 5);

        // primary committed locally...
        assert_eq!(primary.store.read(42, 0, 5).unwrap(), b"hello");
        // ...and the secondary received the fanned-out `serialized_write`.
        assert_eq!(secondary.store.read(42, 0, 5).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn append_fans_out_at_the_primarys_chosen_offset() {
        let (_d1, store1) = store();
        let (_d2, store2) = store();

        let secondary = Arc::new(ChunkServer::new(
            "secondary".to_string(),
            "127.0.0.1:1".to_string(),
            Config::default(),
            store2,
        ));
        let secondary_addr = spawn(secondary.clone()).await;

        let primary = ChunkServer::new("primary".to_string(), "127.0.0.1:1".to_string(), Config::default(), store1);
        let replicas = vec!["primary".to_string(), secondary_addr];

        primary.push_data(1, 1, b"aaa".to_vec());
        secondary.push_data(1, 1, b"aaa".to_vec());
        let first = primary.append(1, 1, "/f", 0, 7, &replicas).await.unwrap();
        assert!(matches!(first, AppendOutcome::Appended { offset: 0 }));

        primary.push_data(1, 2, b"bb".to_vec());
        secondary.push_data(1, 2, b"bb".to_vec());
        let second = primary.append(1, 2, "/f", 0, 7, &replicas).await.unwrap();
        assert!(matches!(second, AppendOutcome::Appended { offset: 3 }));

        assert_eq!(primary.store.read(7, 0, 5).unwrap(), b"aaabb");
        assert_eq!(secondary.store.read(7, 0, 5).unwrap(), b"aaabb");
    }

    #[tokio::test]
    async fn append_reports_retry_without_consuming_pending_data_and_does_not_reach_secondary() {
        let (_d1, store1) = store();
        let (_d2, store2) = store();

        let secondary = Arc::new(ChunkServer::new(
            "secondary".to_string(),
            "127.0.0.1:1".to_string(),
            Config::default(),
            store2,
        ));
        let secondary_addr = spawn(secondary.clone()).await;

        let config = Config {
            chunk_size: 4,
            ..Config::default()
        };
        let primary = ChunkServer::new("primary".to_string(), "127.0.0.1:1".to_string(), config, store1);
        let replicas = vec!["primary".to_string(), secondary_addr];

        primary.push_data(1, 1, b"xxx".to_vec());
        primary.append(1, 1, "/f", 0, 9, &replicas).await.unwrap();

        primary.push_data(1, 2, b"yy".to_vec());
        let outcome = primary.append(1, 2, "/f", 0, 9, &replicas).await.unwrap();
        assert!(matches!(outcome, AppendOutcome::RetryNextChunk));

        // Refused appends never reach the secondary.
        assert!(secondary.store.chunk_info(9).is_err());
    }

    #[tokio::test]
    async fn heartbeat_deletes_requested_chunks_and_reports_held_handles() {
        let (_d, store) = store();
        let server = ChunkServer::new("cs".to_string(), "127.0.0.1:1".to_string(), Config::default(), store);

        server.push_data(1, 1, b"keep".to_vec());
        server.store.commit_write(1, 1, "/a", 0, 1, 0).unwrap();
        server.push_data(1, 2, b"drop".to_vec());
        server.store.commit_write(1, 2, "/b", 0, 2, 0).unwrap();

        let resp = server.heartbeat(&HeartbeatRequest {
            chunks_to_delete: vec![2],
        });

        assert_eq!(resp.held_handles, vec![1]);
        assert!(server.store.chunk_info(2).is_err());
        assert!(server.store.chunk_info(1).is_ok());
    }
}
