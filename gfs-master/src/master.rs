//! The master: a process-wide singleton, modeled as a value created at
//! startup and handed to the RPC dispatcher rather than module-level state
//! (spec.md §9).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gfs_types::messages::{
    AddChunkResponse, DirEntry, FindLeaseHolderResponse, FindLocationsResponse, GetFileLengthResponse,
    ListResponse, ReportChunkRequest,
};
use gfs_types::{Address, ChunkHandle, ChunkIndex, Config, GfsError};

use crate::chunk_manager::ChunkManager;
use crate::namespace_manager::NamespaceManager;
use crate::operation_log::{OpRecord, OperationLog};

pub struct Master {
    pub config: Config,
    pub namespace: NamespaceManager,
    pub chunks: ChunkManager,
    oplog: Arc<OperationLog>,
    client_id_counter: AtomicU64,
}

impl Master {
    /// Opens (or creates) the operation log at `log_path`, replays it, and
    /// reinstates namespace and chunk state from the replayed records.
    pub fn open<P: AsRef<Path>>(log_path: P, config: Config) -> anyhow::Result<Self> {
        let oplog = Arc::new(OperationLog::open(&log_path)?);
        let records = OperationLog::replay(&log_path)?;

        let client_id_counter = records
            .iter()
            .filter_map(|r| match r {
                OpRecord::GrantClientId { counter } => Some(*counter),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            namespace: NamespaceManager::new(oplog.clone(), &records),
            chunks: ChunkManager::new(oplog.clone(), config, &records),
            config,
            oplog,
            client_id_counter: AtomicU64::new(client_id_counter),
        })
    }

    pub fn unique_client_id(&self) -> Result<u64, GfsError> {
        let id = self.client_id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.oplog
            .append(&OpRecord::GrantClientId { counter: id })
            .map_err(|e| GfsError::Other(e.to_string()))?;
        Ok(id)
    }

    pub fn create(&self, path: &str) -> Result<(), GfsError> {
        self.namespace.create(path)
    }

    pub fn create_dir(&self, path: &str) -> Result<(), GfsError> {
        self.namespace.create_dir(path)
    }

    pub fn list(&self, path: &str) -> Result<ListResponse, GfsError> {
        let entries = self
            .namespace
            .list(path)?
            .into_iter()
            .map(|(path, e)| DirEntry {
                path,
                is_dir: e.is_dir,
                length: e.length,
            })
            .collect();
        Ok(ListResponse { entries })
    }

    pub fn delete(&self, path: &str) -> Result<(), GfsError> {
        let was_file = self.namespace.delete(path)?;
        if was_file {
            self.chunks.update_delete_chunk_list(path);
        }
        Ok(())
    }

    pub fn get_file_length(&self, path: &str) -> Result<GetFileLengthResponse, GfsError> {
        Ok(GetFileLengthResponse {
            length: self.namespace.get_file_length(path)?,
        })
    }

    pub fn add_chunk(&self, path: &str, chunk_index: ChunkIndex) -> Result<AddChunkResponse, GfsError> {
        if !self.namespace.exists(path) {
            return Err(GfsError::FileNotFound(path.to_string()));
        }
        let (handle, replicas) = self.chunks.add_chunk(path, chunk_index)?;
        Ok(AddChunkResponse { handle, replicas })
    }

    pub fn find_locations(&self, path: &str, chunk_index: ChunkIndex) -> Result<FindLocationsResponse, GfsError> {
        let (handle, replicas) = self.chunks.find_locations(path, chunk_index)?;
        Ok(FindLocationsResponse { handle, replicas })
    }

    pub fn find_lease_holder(&self, chunk_handle: ChunkHandle) -> Result<FindLeaseHolderResponse, GfsError> {
        let lease = self.chunks.find_lease_holder(chunk_handle)?;
        let expiration = lease
            .expiration
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Ok(FindLeaseHolderResponse {
            primary: lease.primary,
            expiration,
        })
    }

    /// Reinstates a chunk server's reported holdings. Uses the reverse
    /// (`handle -> path, chunk_index`) map as the source of truth for the
    /// path, per the design note that it — not whatever path the chunk
    /// server itself supplies — is authoritative (spec.md §9).
    pub fn report_chunk(&self, req: &ReportChunkRequest) -> Result<(), GfsError> {
        self.chunks.set_chunk_location(req.chunk_handle, &req.address);
        for handle in &req.held_handles {
            self.chunks.set_chunk_location(*handle, &req.address);
        }

        let (path, chunk_index) = self.chunks.get_path_index_from_handle(req.chunk_handle)?;
        let file_length = chunk_index * self.config.chunk_size + req.length;
        self.namespace.set_file_length(&path, file_length);
        Ok(())
    }

    pub fn notify_master(&self, address: &Address) -> Result<(), GfsError> {
        self.chunks.update_chunkserver_list(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> (tempfile::TempDir, Master) {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("oplog");
        let master = Master::open(&log_path, Config::default()).unwrap();
        (dir, master)
    }

    #[test]
    fn unique_client_id_is_monotonic() {
        let (_dir, master) = master();
        let a = master.unique_client_id().unwrap();
        let b = master.unique_client_id().unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn report_chunk_grows_file_length_via_reverse_map() {
        let (_dir, master) = master();
        master.notify_master(&"cs1".to_string()).unwrap();
        master.create("/f").unwrap();
        let added = master.add_chunk("/f", 0).unwrap();

        master
            .report_chunk(&ReportChunkRequest {
                chunk_handle: added.handle,
                address: "cs1".to_string(),
                length: 10,
                held_handles: vec![],
            })
            .unwrap();

        assert_eq!(master.get_file_length("/f").unwrap().length, 10);
    }

    #[test]
    fn restart_replays_namespace_and_handle_counter() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("oplog");
        {
            let master = Master::open(&log_path, Config::default()).unwrap();
            master.notify_master(&"cs1".to_string()).unwrap();
            master.create_dir("/x").unwrap();
            master.create("/x/y").unwrap();
            master.add_chunk("/x/y", 0).unwrap();
        }

        let restarted = Master::open(&log_path, Config::default()).unwrap();
        assert!(restarted.namespace.exists("/x"));
        assert!(restarted.namespace.exists("/x/y"));
        let (handle, _) = restarted.add_chunk("/x/y", 1).map(|r| (r.handle, r.replicas)).unwrap();
        assert_eq!(handle, 1);
    }
}
