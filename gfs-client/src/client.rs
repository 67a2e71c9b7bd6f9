//! Client write/append/read pipeline (spec.md §4.6). Holds a `client_id`
//! granted once at startup and two TTL-bounded caches; every cache miss
//! falls back to a master RPC.

use std::sync::Mutex;
use std::time::Duration;

use gfs_types::messages::{
    AddChunkRequest, AppendOutcome, AppendRequest, CreateDirRequest, CreateRequest, DeleteRequest,
    FindLeaseHolderRequest, FindLocationsRequest, GetFileLengthRequest, ListRequest, PushDataRequest, ReadRequest,
    UniqueClientIdResponse, WriteRequest,
};
use gfs_types::{Address, ChunkHandle, ChunkIndex, Config, GfsError};
use gfs_tools::TtlCache;

/// Bound on how long a cached lease holder is trusted, independent of the
/// lease's own expiration: must be `<= LEASE_TIMEOUT` (spec.md §4.6).
const LEASE_CACHE_TTL: Duration = Duration::from_secs(30);
const LOCATION_CACHE_TTL: Duration = Duration::from_secs(30);

pub struct GfsClient {
    master_addr: Address,
    client_id: u64,
    config: Config,
    locations: Mutex<TtlCache<(String, ChunkIndex), (ChunkHandle, Vec<Address>)>>,
    leases: Mutex<TtlCache<ChunkHandle, (Address, u64)>>,
}

impl GfsClient {
    pub async fn connect(master_addr: Address, config: Config) -> Result<Self, GfsError> {
        let resp: UniqueClientIdResponse =
            gfs_tools::rpc::call_rpc(&master_addr, "unique_client_id", &()).await?;
        Ok(Self {
            master_addr,
            client_id: resp.client_id,
            config,
            locations: Mutex::new(TtlCache::new()),
            leases: Mutex::new(TtlCache::new()),
        })
    }

    pub async fn create(&self, path: &str) -> Result<(), GfsError> {
        gfs_tools::rpc::call_rpc(&self.master_addr, "create", &CreateRequest { path: path.to_string() }).await
    }

    pub async fn create_dir(&self, path: &str) -> Result<(), GfsError> {
        gfs_tools::rpc::call_rpc(&self.master_addr, "create_dir", &CreateDirRequest { path: path.to_string() }).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), GfsError> {
        gfs_tools::rpc::call_rpc(&self.master_addr, "delete", &DeleteRequest { path: path.to_string() }).await
    }

    pub async fn list(&self, path: &str) -> Result<Vec<gfs_types::messages::DirEntry>, GfsError> {
        let resp: gfs_types::messages::ListResponse =
            gfs_tools::rpc::call_rpc(&self.master_addr, "list", &ListRequest { path: path.to_string() }).await?;
        Ok(resp.entries)
    }

    pub async fn get_file_length(&self, path: &str) -> Result<u64, GfsError> {
        let resp: gfs_types::messages::GetFileLengthResponse = gfs_tools::rpc::call_rpc(
            &self.master_addr,
            "get_file_length",
            &GetFileLengthRequest { path: path.to_string() },
        )
        .await?;
        Ok(resp.length)
    }

    /// Resolves `(path, chunk_index)` to `(handle, replicas)`, allocating
    /// the chunk if absent. If a concurrent client wins the allocation race
    /// (`ChunkAlreadyExists`), re-queries rather than failing.
    async fn get_chunk_guaranteed(&self, path: &str, chunk_index: ChunkIndex) -> Result<(ChunkHandle, Vec<Address>), GfsError> {
        if let Some(cached) = self.locations.lock().unwrap().get(&(path.to_string(), chunk_index)) {
            return Ok(cached);
        }

        let found = self.find_locations(path, chunk_index).await;
        let result = match found {
            Ok(v) => v,
            Err(GfsError::FileNotFound(_)) | Err(GfsError::ChunkIndexNotFound(_)) => {
                let add_result: Result<gfs_types::messages::AddChunkResponse, GfsError> = gfs_tools::rpc::call_rpc(
                    &self.master_addr,
                    "add_chunk",
                    &AddChunkRequest {
                        path: path.to_string(),
                        chunk_index,
                    },
                )
                .await;
                match add_result {
                    Ok(resp) => (resp.handle, resp.replicas),
                    Err(GfsError::ChunkAlreadyExists(_)) => self.find_locations(path, chunk_index).await?,
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        self.locations
            .lock()
            .unwrap()
            .insert((path.to_string(), chunk_index), result.clone(), LOCATION_CACHE_TTL);
        Ok(result)
    }

    async fn find_locations(&self, path: &str, chunk_index: ChunkIndex) -> Result<(ChunkHandle, Vec<Address>), GfsError> {
        let resp: gfs_types::messages::FindLocationsResponse = gfs_tools::rpc::call_rpc(
            &self.master_addr,
            "find_locations",
            &FindLocationsRequest {
                path: path.to_string(),
                chunk_index,
            },
        )
        .await?;
        Ok((resp.handle, resp.replicas))
    }

    async fn find_lease_holder(&self, chunk_handle: ChunkHandle) -> Result<Address, GfsError> {
        if let Some((primary, _)) = self.leases.lock().unwrap().get(&chunk_handle) {
            return Ok(primary);
        }
        let resp: gfs_types::messages::FindLeaseHolderResponse = gfs_tools::rpc::call_rpc(
            &self.master_addr,
            "find_lease_holder",
            &FindLeaseHolderRequest { chunk_handle },
        )
        .await?;
        self.leases.lock().unwrap().insert(
            chunk_handle,
            (resp.primary.clone(), resp.expiration),
            LEASE_CACHE_TTL,
        );
        Ok(resp.primary)
    }

    fn data_id(&self) -> (u64, u64) {
        (self.client_id, gfs_tools::time::now_micros())
    }

    /// Pushes `slice` to every replica, commits it via the primary at
    /// `[start_in_chunk, end_in_chunk)` (spec.md §4.6).
    async fn write_helper(&self, path: &str, chunk_index: ChunkIndex, start_in_chunk: u64, slice: &[u8]) -> Result<(), GfsError> {
        let (handle, replicas) = self.get_chunk_guaranteed(path, chunk_index).await?;
        let (client_id, timestamp) = self.data_id();

        for replica in &replicas {
            gfs_tools::rpc::call_rpc::<_, ()>(
                replica,
                "push_data",
                &PushDataRequest {
                    client_id,
                    timestamp,
                    data: slice.to_vec(),
                },
            )
            .await?;
        }

        let primary = self.find_lease_holder(handle).await?;
        gfs_tools::rpc::call_rpc::<_, gfs_types::messages::WriteResponse>(
            &primary,
            "write",
            &WriteRequest {
                client_id,
                timestamp,
                path: path.to_string(),
                chunk_index,
                chunk_handle: handle,
                offset: start_in_chunk,
                replicas,
            },
        )
        .await?;
        Ok(())
    }

    /// Splits `data` across chunks starting at `byte_offset` and writes
    /// each in turn. Aborts (without rolling earlier chunks back) on the
    /// first failure, per spec.md §5's "no multi-chunk atomicity".
    pub async fn write(&self, path: &str, byte_offset: u64, data: &[u8]) -> Result<(), GfsError> {
        let chunk_size = self.config.chunk_size;
        let mut written = 0usize;
        while written < data.len() {
            let offset = byte_offset + written as u64;
            let chunk_index = self.config.chunk_index_for_offset(offset);
            let start_in_chunk = self.config.offset_in_chunk(offset);
            let room = chunk_size - start_in_chunk;
            let take = room.min((data.len() - written) as u64) as usize;

            self.write_helper(path, chunk_index, start_in_chunk, &data[written..written + take])
                .await?;
            written += take;
        }
        Ok(())
    }

    /// Appends `data` as a single atomic record. Refuses outright if it
    /// exceeds `APPEND_SIZE`; retries against the next chunk index when the
    /// primary reports the current chunk would overflow.
    pub async fn append(&self, path: &str, data: &[u8]) -> Result<u64, GfsError> {
        if data.len() as u64 > self.config.append_size {
            return Err(GfsError::AppendWouldOverflow(format!(
                "{} bytes exceeds append_size {}",
                data.len(),
                self.config.append_size
            )));
        }

        let file_length = self.get_file_length(path).await?;
        let mut chunk_index = self.config.chunk_index_for_offset(file_length);

        loop {
            let (handle, replicas) = self.get_chunk_guaranteed(path, chunk_index).await?;
            let (client_id, timestamp) = self.data_id();

            for replica in &replicas {
                gfs_tools::rpc::call_rpc::<_, ()>(
                    replica,
                    "push_data",
                    &PushDataRequest {
                        client_id,
                        timestamp,
                        data: data.to_vec(),
                    },
                )
                .await?;
            }

            let primary = self.find_lease_holder(handle).await?;
            let outcome: AppendOutcome = gfs_tools::rpc::call_rpc(
                &primary,
                "append",
                &AppendRequest {
                    client_id,
                    timestamp,
                    chunk_handle: handle,
                    chunk_index,
                    path: path.to_string(),
                    replicas,
                },
            )
            .await?;

            match outcome {
                AppendOutcome::Appended { offset } => return Ok(offset),
                AppendOutcome::RetryNextChunk => chunk_index += 1,
            }
        }
    }

    /// Reads `bytes_to_read` bytes (or to end of file if negative-as-`u64`
    /// is not representable — callers pass the file length explicitly via
    /// `get_file_length` for a "read to end" read) starting at
    /// `byte_offset`, choosing a uniformly random replica per chunk rather
    /// than the primary specifically (spec.md §4.6).
    pub async fn read(&self, path: &str, byte_offset: u64, bytes_to_read: u64) -> Result<Vec<u8>, GfsError> {
        let chunk_size = self.config.chunk_size;
        let mut out = Vec::with_capacity(bytes_to_read as usize);
        let mut remaining = bytes_to_read;
        let mut offset = byte_offset;

        while remaining > 0 {
            let chunk_index = self.config.chunk_index_for_offset(offset);
            let start_in_chunk = self.config.offset_in_chunk(offset);
            let room = chunk_size - start_in_chunk;
            let take = room.min(remaining);

            let (handle, replicas) = self.get_chunk_guaranteed(path, chunk_index).await?;
            let replica = gfs_tools::rng::pick_one(&replicas)
                .ok_or_else(|| GfsError::NoChunkServerAlive(handle.to_string()))?;

            let resp: gfs_types::messages::ReadResponse = gfs_tools::rpc::call_rpc(
                &replica,
                "read",
                &ReadRequest {
                    chunk_handle: handle,
                    offset: start_in_chunk,
                    length: take,
                },
            )
            .await?;

            let got = resp.data.len() as u64;
            out.extend_from_slice(&resp.data);
            offset += got;
            remaining -= got;
            if got < take {
                break;
            }
        }
        Ok(out)
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }
}
