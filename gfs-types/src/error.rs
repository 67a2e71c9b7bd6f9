use serde::{Deserialize, Serialize};

/// Error kinds exchanged between master, chunk server and client.
///
/// Unlike an opaque `anyhow::Error`, this type is serialized on the wire
/// so a caller can match on `kind` rather than parse a message string
/// (e.g. the client recovers from `ChunkAlreadyExists` and
/// `AppendWouldOverflow` by retrying, see `gfs-client`).
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message")]
pub enum GfsError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("parent of {0} is not a directory")]
    ParentIsNotDir(String),

    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("directory already exists: {0}")]
    DirAlreadyExists(String),

    #[error("directory is not empty: {0}")]
    DirIsNotEmpty(String),

    #[error("chunk already exists for {0}")]
    ChunkAlreadyExists(String),

    #[error("chunk index not found: {0}")]
    ChunkIndexNotFound(String),

    #[error("chunk handle not found: {0}")]
    ChunkHandleNotFound(String),

    #[error("no chunk server alive to serve handle {0}")]
    NoChunkServerAlive(String),

    #[error("data not in memory: {0}")]
    DataNotInMemory(String),

    #[error("append would overflow chunk: {0}")]
    AppendWouldOverflow(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl GfsError {
    /// HTTP status code a RPC handler should answer with for this kind,
    /// mirroring `proxmox_router::HttpError`'s code/message split.
    pub fn status_code(&self) -> u16 {
        match self {
            GfsError::PathNotFound(_)
            | GfsError::FileNotFound(_)
            | GfsError::ChunkIndexNotFound(_)
            | GfsError::ChunkHandleNotFound(_) => 404,
            GfsError::FileAlreadyExists(_)
            | GfsError::DirAlreadyExists(_)
            | GfsError::ChunkAlreadyExists(_)
            | GfsError::DirIsNotEmpty(_) => 409,
            GfsError::NoChunkServerAlive(_) => 503,
            GfsError::Transport(_) => 502,
            GfsError::ParentIsNotDir(_)
            | GfsError::DataNotInMemory(_)
            | GfsError::AppendWouldOverflow(_)
            | GfsError::Other(_) => 400,
        }
    }
}

pub type GfsResult<T> = Result<T, GfsError>;
