//! Local chunk storage (spec.md §4.5). One regular file per chunk, named by
//! the decimal chunk handle, under a configurable directory. Opened
//! read-write-create and seeked for every write, never truncated — the
//! source this was modeled on truncates on every write, which the
//! specification calls out as a bug (spec.md §9).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gfs_types::{ChunkHandle, ChunkIndex, GfsError};

#[derive(Debug, Clone)]
pub struct ChunkInfo {
    pub path: String,
    pub chunk_index: ChunkIndex,
    pub length: u64,
}

struct State {
    chunk_info: HashMap<ChunkHandle, ChunkInfo>,
}

/// `mutex` guards `chunk_info` and all on-disk writes; `data_mutex` guards
/// the pending push/commit buffer. Lock order is always `mutex` before
/// `data_mutex` — `push_data` only ever takes `data_mutex` so this is
/// trivially respected (spec.md §4.5, §9).
pub struct ChunkStore {
    base_dir: PathBuf,
    mutex: Mutex<State>,
    data_mutex: Mutex<HashMap<(u64, u64), Vec<u8>>>,
}

impl ChunkStore {
    pub fn open<P: AsRef<Path>>(base_dir: P) -> std::io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            mutex: Mutex::new(State {
                chunk_info: HashMap::new(),
            }),
            data_mutex: Mutex::new(HashMap::new()),
        })
    }

    fn chunk_path(&self, handle: ChunkHandle) -> PathBuf {
        self.base_dir.join(handle.to_string())
    }

    /// Idempotent: a second push with the same `(client_id, timestamp)` key
    /// leaves the first payload in place (spec.md §8 round-trip property).
    pub fn push_data(&self, client_id: u64, timestamp: u64, data: Vec<u8>) {
        let mut pending = self.data_mutex.lock().unwrap();
        pending.entry((client_id, timestamp)).or_insert(data);
    }

    fn take_pending(&self, client_id: u64, timestamp: u64) -> Result<Vec<u8>, GfsError> {
        let mut pending = self.data_mutex.lock().unwrap();
        pending
            .remove(&(client_id, timestamp))
            .ok_or_else(|| GfsError::DataNotInMemory(format!("{client_id}:{timestamp}")))
    }

    fn open_rw(&self, handle: ChunkHandle) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.chunk_path(handle))
    }

    /// Writes `data` at `offset` inside the chunk file, returns the new
    /// total chunk length and whether it grew.
    fn write_at(&self, path: &str, chunk_index: ChunkIndex, handle: ChunkHandle, offset: u64, data: &[u8]) -> Result<(u64, bool), GfsError> {
        let mut file = self.open_rw(handle).map_err(|e| GfsError::Other(e.to_string()))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| GfsError::Other(e.to_string()))?;
        file.write_all(data).map_err(|e| GfsError::Other(e.to_string()))?;

        let mut state = self.mutex.lock().unwrap();
        let entry = state.chunk_info.entry(handle).or_insert_with(|| ChunkInfo {
            path: path.to_string(),
            chunk_index,
            length: 0,
        });
        let candidate = offset + data.len() as u64;
        let grew = candidate > entry.length;
        if grew {
            entry.length = candidate;
        }
        Ok((entry.length, grew))
    }

    /// Applies a commit for `(client_id, timestamp)` at `offset`, consuming
    /// the staged bytes. Returns the chunk's new length and whether it grew
    /// (the caller decides whether to report that growth to the master).
    pub fn commit_write(
        &self,
        client_id: u64,
        timestamp: u64,
        path: &str,
        chunk_index: ChunkIndex,
        handle: ChunkHandle,
        offset: u64,
    ) -> Result<(u64, u64, bool), GfsError> {
        let data = self.take_pending(client_id, timestamp)?;
        let written = data.len() as u64;
        let (length, grew) = self.write_at(path, chunk_index, handle, offset, &data)?;
        Ok((written, length, grew))
    }

    /// Current length of `handle`, or 0 if nothing has been written yet.
    pub fn chunk_length(&self, handle: ChunkHandle) -> u64 {
        self.mutex
            .lock()
            .unwrap()
            .chunk_info
            .get(&handle)
            .map(|i| i.length)
            .unwrap_or(0)
    }

    /// Appends a commit for `(client_id, timestamp)` at the current end of
    /// the chunk. Refuses (without consuming the pending data) if the
    /// result would not fit inside one chunk.
    pub fn commit_append(
        &self,
        client_id: u64,
        timestamp: u64,
        path: &str,
        chunk_index: ChunkIndex,
        handle: ChunkHandle,
        chunk_size: u64,
    ) -> Result<Option<(u64, u64)>, GfsError> {
        let pending_len = {
            let pending = self.data_mutex.lock().unwrap();
            pending
                .get(&(client_id, timestamp))
                .map(|d| d.len() as u64)
                .ok_or_else(|| GfsError::DataNotInMemory(format!("{client_id}:{timestamp}")))?
        };

        let offset = self.chunk_length(handle);
        if offset + pending_len >= chunk_size {
            return Ok(None);
        }

        let data = self.take_pending(client_id, timestamp)?;
        let (length, _grew) = self.write_at(path, chunk_index, handle, offset, &data)?;
        Ok(Some((offset, length)))
    }

    pub fn read(&self, handle: ChunkHandle, offset: u64, length: u64) -> Result<Vec<u8>, GfsError> {
        let mut file = File::open(self.chunk_path(handle)).map_err(|e| GfsError::Other(e.to_string()))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| GfsError::Other(e.to_string()))?;
        let mut buf = vec![0u8; length as usize];
        let n = file.read(&mut buf).map_err(|e| GfsError::Other(e.to_string()))?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn chunk_info(&self, handle: ChunkHandle) -> Result<ChunkInfo, GfsError> {
        self.mutex
            .lock()
            .unwrap()
            .chunk_info
            .get(&handle)
            .cloned()
            .ok_or_else(|| GfsError::ChunkHandleNotFound(handle.to_string()))
    }

    /// Persists a chunk fetched whole from a peer (used by
    /// `order_chunk_copy_from_peer`).
    pub fn store_whole(&self, handle: ChunkHandle, path: &str, chunk_index: ChunkIndex, data: &[u8]) -> Result<u64, GfsError> {
        let (length, _grew) = self.write_at(path, chunk_index, handle, 0, data)?;
        Ok(length)
    }

    pub fn delete_chunk(&self, handle: ChunkHandle) {
        let mut state = self.mutex.lock().unwrap();
        state.chunk_info.remove(&handle);
        let _ = std::fs::remove_file(self.chunk_path(handle));
    }

    pub fn held_handles(&self) -> Vec<ChunkHandle> {
        self.mutex.lock().unwrap().chunk_info.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn push_data_is_first_wins_idempotent() {
        let (_d, store) = store();
        store.push_data(1, 10, b"first".to_vec());
        store.push_data(1, 10, b"second".to_vec());
        let (written, _, _) = store.commit_write(1, 10, "/f", 0, 5, 0).unwrap();
        assert_eq!(written, 5); // "first".len()
    }

    #[test]
    fn commit_write_without_push_fails() {
        let (_d, store) = store();
        assert!(matches!(
            store.commit_write(1, 10, "/f", 0, 5, 0),
            Err(GfsError::DataNotInMemory(_))
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_d, store) = store();
        store.push_data(1, 1, b"hello world".to_vec());
        store.commit_write(1, 1, "/f", 0, 7, 0).unwrap();
        let read = store.read(7, 0, 11).unwrap();
        assert_eq!(read, b"hello world");
    }

    #[test]
    fn overwrite_range_preserves_surrounding_bytes() {
        let (_d, store) = store();
        store.push_data(1, 1, b"aaaaaaaaaa".to_vec());
        store.commit_write(1, 1, "/f", 0, 9, 0).unwrap();
        store.push_data(1, 2, b"BB".to_vec());
        store.commit_write(1, 2, "/f", 0, 9, 2).unwrap();
        let read = store.read(9, 0, 10).unwrap();
        assert_eq!(read, b"aaBBaaaaaa");
    }

    #[test]
    fn append_refuses_when_chunk_would_overflow() {
        let (_d, store) = store();
        store.push_data(1, 1, vec![0u8; 3]);
        store.commit_append(1, 1, "/f", 0, 3, 4).unwrap();
        store.push_data(1, 2, vec![0u8; 2]);
        let result = store.commit_append(1, 2, "/f", 0, 3, 4).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn held_handles_reflects_written_chunks() {
        let (_d, store) = store();
        store.push_data(1, 1, b"x".to_vec());
        store.commit_write(1, 1, "/f", 0, 42, 0).unwrap();
        assert_eq!(store.held_handles(), vec![42]);
    }
}
