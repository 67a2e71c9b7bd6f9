//! Chunk-handle allocation, replica placement and the lease protocol
//! (spec.md §4.2, §4.4). Four in-memory maps behind one mutex, plus a
//! monotonic handle counter; every allocating operation appends an
//! operation-log entry before returning.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use gfs_types::{Address, ChunkHandle, ChunkIndex, Config, GfsError};

use crate::operation_log::{OpRecord, OperationLog};

#[derive(Debug, Clone)]
pub struct Lease {
    pub primary: Address,
    pub expiration: SystemTime,
}

impl Lease {
    fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expiration
    }
}

struct State {
    next_handle: ChunkHandle,
    /// (path, chunk_index) -> handle
    chunks: HashMap<(String, ChunkIndex), ChunkHandle>,
    /// handle -> (path, chunk_index), inverse of `chunks`
    handles: HashMap<ChunkHandle, (String, ChunkIndex)>,
    /// path -> every chunk_index ever allocated for it, so `find_locations`
    /// can tell "no file" from "file exists, this index isn't allocated"
    chunk_indices_by_path: HashMap<String, HashSet<ChunkIndex>>,
    /// handle -> current replica set
    locations: HashMap<ChunkHandle, Vec<Address>>,
    /// handle -> active lease
    leases: HashMap<ChunkHandle, Lease>,
    /// addresses currently believed alive
    active_servers: HashSet<Address>,
    /// server address -> chunk handles it is known to hold
    server_chunks: HashMap<Address, HashSet<ChunkHandle>>,
    /// chunk handles pending garbage collection, piggy-backed on heartbeats
    delete_queue: Vec<ChunkHandle>,
}

pub struct ChunkManager {
    oplog: Arc<OperationLog>,
    config: Config,
    state: Mutex<State>,
}

impl ChunkManager {
    pub fn new(oplog: Arc<OperationLog>, config: Config, records: &[OpRecord]) -> Self {
        let manager = Self {
            oplog,
            config,
            state: Mutex::new(State {
                next_handle: 0,
                chunks: HashMap::new(),
                handles: HashMap::new(),
                chunk_indices_by_path: HashMap::new(),
                locations: HashMap::new(),
                leases: HashMap::new(),
                active_servers: HashSet::new(),
                server_chunks: HashMap::new(),
                delete_queue: Vec::new(),
            }),
        };
        manager.replay(records);
        manager
    }

    fn replay(&self, records: &[OpRecord]) {
        let mut state = self.state.lock().unwrap();
        for record in records {
            match record {
                OpRecord::AddChunk {
                    path,
                    chunk_index,
                    handle,
                    replicas,
                    handle_counter,
                } => {
                    state.chunks.insert((path.clone(), *chunk_index), *handle);
                    state.handles.insert(*handle, (path.clone(), *chunk_index));
                    state
                        .chunk_indices_by_path
                        .entry(path.clone())
                        .or_default()
                        .insert(*chunk_index);
                    state.locations.insert(*handle, replicas.clone());
                    state.next_handle = *handle_counter;
                }
                OpRecord::NotifyMaster { address } => {
                    state.active_servers.insert(address.clone());
                    state.server_chunks.entry(address.clone()).or_default();
                }
                _ => {}
            }
        }
    }

    pub fn update_chunkserver_list(&self, address: &Address) -> Result<(), GfsError> {
        let mut state = self.state.lock().unwrap();
        if !state.active_servers.contains(address) {
            self.oplog
                .append(&OpRecord::NotifyMaster {
                    address: address.clone(),
                })
                .map_err(|e| GfsError::Other(e.to_string()))?;
        }
        state.active_servers.insert(address.clone());
        state.server_chunks.entry(address.clone()).or_default();
        Ok(())
    }

    /// Allocates the next handle and `REPLICATION_FACTOR` distinct random
    /// replicas (fewer if the active set is smaller). Fails with
    /// `ChunkAlreadyExists` if `(path, chunk_index)` is already mapped —
    /// the client recovers by retrying `find_locations`.
    pub fn add_chunk(&self, path: &str, chunk_index: ChunkIndex) -> Result<(ChunkHandle, Vec<Address>), GfsError> {
        let mut state = self.state.lock().unwrap();
        let key = (path.to_string(), chunk_index);
        if state.chunks.contains_key(&key) {
            return Err(GfsError::ChunkAlreadyExists(format!("{path}:{chunk_index}")));
        }

        let active: Vec<Address> = state.active_servers.iter().cloned().collect();
        let replicas = gfs_tools::rng::pick_distinct(&active, self.config.replication_factor);

        let handle = state.next_handle;
        let next_handle = handle + 1;

        self.oplog
            .append(&OpRecord::AddChunk {
                path: path.to_string(),
                chunk_index,
                handle,
                replicas: replicas.clone(),
                handle_counter: next_handle,
            })
            .map_err(|e| GfsError::Other(e.to_string()))?;

        state.next_handle = next_handle;
        state.chunks.insert(key, handle);
        state.handles.insert(handle, (path.to_string(), chunk_index));
        state
            .chunk_indices_by_path
            .entry(path.to_string())
            .or_default()
            .insert(chunk_index);
        state.locations.insert(handle, replicas.clone());
        for server in &replicas {
            state.server_chunks.entry(server.clone()).or_default().insert(handle);
        }

        Ok((handle, replicas))
    }

    /// Distinguishes "no file" from "file exists, this chunk_index was
    /// never allocated" (spec.md §4.2's three-way `find_locations` failure
    /// taxonomy): the former checks `chunk_indices_by_path`, the latter
    /// `chunks` itself.
    pub fn find_locations(&self, path: &str, chunk_index: ChunkIndex) -> Result<(ChunkHandle, Vec<Address>), GfsError> {
        let state = self.state.lock().unwrap();
        if !state.chunk_indices_by_path.contains_key(path) {
            return Err(GfsError::FileNotFound(path.to_string()));
        }
        let handle = *state
            .chunks
            .get(&(path.to_string(), chunk_index))
            .ok_or_else(|| GfsError::ChunkIndexNotFound(format!("{path}:{chunk_index}")))?;
        let replicas = state
            .locations
            .get(&handle)
            .cloned()
            .ok_or_else(|| GfsError::ChunkIndexNotFound(format!("{path}:{chunk_index}")))?;
        if replicas.is_empty() {
            return Err(GfsError::NoChunkServerAlive(handle.to_string()));
        }
        Ok((handle, replicas))
    }

    /// Returns the current lease for `chunk_handle`, granting a fresh one
    /// (uniformly random primary, `LEASE_TIMEOUT` from now) if absent or
    /// expired (spec.md §4.4).
    pub fn find_lease_holder(&self, chunk_handle: ChunkHandle) -> Result<Lease, GfsError> {
        let mut state = self.state.lock().unwrap();

        if let Some(lease) = state.leases.get(&chunk_handle) {
            if !lease.is_expired() {
                return Ok(lease.clone());
            }
        }

        let replicas = state
            .locations
            .get(&chunk_handle)
            .cloned()
            .ok_or_else(|| GfsError::ChunkHandleNotFound(chunk_handle.to_string()))?;

        let primary = gfs_tools::rng::pick_one(&replicas)
            .ok_or_else(|| GfsError::NoChunkServerAlive(chunk_handle.to_string()))?;

        let lease = Lease {
            primary,
            expiration: SystemTime::now() + self.config.lease_timeout(),
        };
        state.leases.insert(chunk_handle, lease.clone());
        Ok(lease)
    }

    /// Idempotent: called from `report_chunk` once a chunk server confirms
    /// it holds `chunk_handle`.
    pub fn set_chunk_location(&self, chunk_handle: ChunkHandle, address: &Address) {
        let mut state = self.state.lock().unwrap();
        let entry = state.locations.entry(chunk_handle).or_default();
        if !entry.contains(address) {
            entry.push(address.clone());
        }
        state
            .server_chunks
            .entry(address.clone())
            .or_default()
            .insert(chunk_handle);
    }

    pub fn get_path_index_from_handle(&self, chunk_handle: ChunkHandle) -> Result<(String, ChunkIndex), GfsError> {
        let state = self.state.lock().unwrap();
        state
            .handles
            .get(&chunk_handle)
            .cloned()
            .ok_or_else(|| GfsError::ChunkHandleNotFound(chunk_handle.to_string()))
    }

    /// Moves every chunk handle associated with `path` into the delete
    /// queue so heartbeats instruct chunk servers to drop them.
    pub fn update_delete_chunk_list(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let handles: Vec<ChunkHandle> = state
            .handles
            .iter()
            .filter(|(_, (p, _))| p == path)
            .map(|(h, _)| *h)
            .collect();
        state.delete_queue.extend(handles);
    }

    /// Snapshots and clears the accumulated delete queue for one heartbeat
    /// round (so concurrent `delete()` calls during the probe don't race
    /// on the same `Vec`).
    pub fn take_delete_queue(&self) -> Vec<ChunkHandle> {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.delete_queue)
    }

    pub fn active_servers(&self) -> Vec<Address> {
        self.state.lock().unwrap().active_servers.iter().cloned().collect()
    }

    /// Drops `address` from the active set and returns the chunk handles it
    /// was known to hold, so the caller (heartbeat loop) can plan
    /// re-replication while holding no lock.
    pub fn remove_server(&self, address: &Address) -> Vec<ChunkHandle> {
        let mut state = self.state.lock().unwrap();
        state.active_servers.remove(address);
        let handles = state
            .server_chunks
            .remove(address)
            .unwrap_or_default()
            .into_iter()
            .collect::<Vec<_>>();
        for handle in &handles {
            if let Some(locs) = state.locations.get_mut(handle) {
                locs.retain(|a| a != address);
            }
        }
        handles
    }

    /// Replica count and active-minus-current candidates for `handle`,
    /// used by the heartbeat loop to decide whether and where to
    /// re-replicate (spec.md §4.7).
    pub fn replication_candidates(&self, handle: ChunkHandle) -> (Vec<Address>, Vec<Address>) {
        let state = self.state.lock().unwrap();
        let current = state.locations.get(&handle).cloned().unwrap_or_default();
        let candidates: Vec<Address> = state
            .active_servers
            .iter()
            .filter(|a| !current.contains(a))
            .cloned()
            .collect();
        (current, candidates)
    }

    pub fn replication_factor(&self) -> usize {
        self.config.replication_factor
    }

    pub fn active_server_count(&self) -> usize {
        self.state.lock().unwrap().active_servers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ChunkManager {
        let dir = tempfile::tempdir().unwrap();
        let oplog = Arc::new(OperationLog::open(dir.path().join("oplog")).unwrap());
        ChunkManager::new(oplog, Config::default(), &[])
    }

    #[test]
    fn add_chunk_allocates_monotonic_handles() {
        let cm = manager();
        cm.update_chunkserver_list(&"a".to_string()).unwrap();
        cm.update_chunkserver_list(&"b".to_string()).unwrap();
        let (h1, _) = cm.add_chunk("/f", 0).unwrap();
        let (h2, _) = cm.add_chunk("/f", 1).unwrap();
        assert_eq!(h1, 0);
        assert_eq!(h2, 1);
    }

    #[test]
    fn add_chunk_twice_same_index_fails() {
        let cm = manager();
        cm.update_chunkserver_list(&"a".to_string()).unwrap();
        cm.add_chunk("/f", 0).unwrap();
        assert!(matches!(cm.add_chunk("/f", 0), Err(GfsError::ChunkAlreadyExists(_))));
    }

    #[test]
    fn replicas_fewer_than_factor_when_pool_small() {
        let cm = manager();
        cm.update_chunkserver_list(&"only-one".to_string()).unwrap();
        let (_, replicas) = cm.add_chunk("/f", 0).unwrap();
        assert_eq!(replicas.len(), 1);
    }

    #[test]
    fn lease_is_stable_until_expiry() {
        let cm = manager();
        cm.update_chunkserver_list(&"a".to_string()).unwrap();
        let (handle, _) = cm.add_chunk("/f", 0).unwrap();
        let lease1 = cm.find_lease_holder(handle).unwrap();
        let lease2 = cm.find_lease_holder(handle).unwrap();
        assert_eq!(lease1.primary, lease2.primary);
        assert_eq!(lease1.expiration, lease2.expiration);
    }

    #[test]
    fn lease_on_chunk_with_no_replicas_fails() {
        let cm = manager();
        assert!(matches!(
            cm.find_lease_holder(999),
            Err(GfsError::ChunkHandleNotFound(_))
        ));
    }

    #[test]
    fn find_locations_distinguishes_missing_file_from_missing_index() {
        let cm = manager();
        cm.update_chunkserver_list(&"a".to_string()).unwrap();
        cm.add_chunk("/f", 0).unwrap();

        assert!(matches!(
            cm.find_locations("/nope", 0),
            Err(GfsError::FileNotFound(_))
        ));
        assert!(matches!(
            cm.find_locations("/f", 1),
            Err(GfsError::ChunkIndexNotFound(_))
        ));
        assert!(cm.find_locations("/f", 0).is_ok());
    }

    #[test]
    fn remove_server_drops_it_from_locations() {
        let cm = manager();
        cm.update_chunkserver_list(&"a".to_string()).unwrap();
        let (handle, replicas) = cm.add_chunk("/f", 0).unwrap();
        assert_eq!(replicas, vec!["a".to_string()]);

        let held = cm.remove_server(&"a".to_string());
        assert_eq!(held, vec![handle]);

        let (current, _) = cm.replication_candidates(handle);
        assert!(current.is_empty());
    }
}
