//! RPC request/response shapes for the master and chunk-server surfaces
//! named in spec.md §6. Every RPC is `POST /<method-name>` with a JSON
//! body matching the `*Request` struct and a JSON `Envelope<*Response>`
//! reply.

use serde::{Deserialize, Serialize};

use crate::error::GfsError;
use crate::{Address, ChunkHandle, ChunkIndex};

/// Wire envelope for every RPC response: `{"ok":true,"result":...}` or
/// `{"ok":false,"error":{"kind":...,"message":...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope<T> {
    Ok { result: T },
    Err { error: GfsError },
}

impl<T> From<Result<T, GfsError>> for Envelope<T> {
    fn from(r: Result<T, GfsError>) -> Self {
        match r {
            Ok(result) => Envelope::Ok { result },
            Err(error) => Envelope::Err { error },
        }
    }
}

impl<T> From<Envelope<T>> for Result<T, GfsError> {
    fn from(e: Envelope<T>) -> Self {
        match e {
            Envelope::Ok { result } => Ok(result),
            Envelope::Err { error } => Err(error),
        }
    }
}

// ---- master: namespace manager ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDirRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub path: String,
    pub is_dir: bool,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub entries: Vec<DirEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileLengthRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileLengthResponse {
    pub length: u64,
}

// ---- master: chunk manager ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddChunkRequest {
    pub path: String,
    pub chunk_index: ChunkIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddChunkResponse {
    pub handle: ChunkHandle,
    pub replicas: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindLocationsRequest {
    pub path: String,
    pub chunk_index: ChunkIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindLocationsResponse {
    pub handle: ChunkHandle,
    pub replicas: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindLeaseHolderRequest {
    pub chunk_handle: ChunkHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindLeaseHolderResponse {
    pub primary: Address,
    /// Unix timestamp (seconds) at which the lease expires.
    pub expiration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportChunkRequest {
    pub chunk_handle: ChunkHandle,
    pub address: Address,
    pub length: u64,
    /// Chunk handles this server currently holds locally, piggy-backed so
    /// the master can reinstate entries after a restart (SPEC_FULL §4.12).
    pub held_handles: Vec<ChunkHandle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyMasterRequest {
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueClientIdResponse {
    pub client_id: u64,
}

// ---- chunk server ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushDataRequest {
    pub client_id: u64,
    pub timestamp: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub client_id: u64,
    pub timestamp: u64,
    pub path: String,
    pub chunk_index: ChunkIndex,
    pub chunk_handle: ChunkHandle,
    pub offset: u64,
    pub replicas: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub client_id: u64,
    pub timestamp: u64,
    pub chunk_handle: ChunkHandle,
    pub chunk_index: ChunkIndex,
    pub path: String,
    pub replicas: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppendOutcome {
    Appended { offset: u64 },
    RetryNextChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub chunk_handle: ChunkHandle,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderChunkCopyRequest {
    pub peer: Address,
    pub chunk_handle: ChunkHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChunkInfoRequest {
    pub chunk_handle: ChunkHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChunkInfoResponse {
    pub path: String,
    pub chunk_index: ChunkIndex,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteBadChunkRequest {
    pub chunk_handle: ChunkHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChunkHandlesResponse {
    pub handles: Vec<ChunkHandle>,
}

/// Heartbeat probe: carries the accumulated delete queue so the chunk
/// server can garbage collect in the same round-trip (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub chunks_to_delete: Vec<ChunkHandle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub held_handles: Vec<ChunkHandle>,
}

/// Binary payloads (pushed data, read results) travel as base64 inside the
/// JSON envelope.
mod base64_bytes {
    use base64::{decode, encode};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        decode(encoded).map_err(serde::de::Error::custom)
    }
}
