//! Append-only operation log: the master's sole durability mechanism
//! (spec.md §4.3). Each line is `<action_code>|||<payload-json>\n`; replay
//! on startup reinstates the namespace and chunk maps and the handle
//! counter. The chunk-location map is *not* part of this log — it is
//! rebuilt from chunk-server reports after recovery (spec.md §4.3
//! rationale, §9).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use gfs_types::{Address, ChunkHandle, ChunkIndex};
use serde::{Deserialize, Serialize};

use gfs_tools::oplog_codec::{encode_line, parse_line};

/// One durable master mutation. `REPORT_CHUNK` and `DEL_BAD_CHUNK` are
/// chunk-server-local concerns (spec.md §4.3 table) and are not replayed
/// here; they exist in the enum only so `action_code()` stays exhaustive
/// with the action-code table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OpRecord {
    GrantClientId { counter: u64 },
    NotifyMaster { address: Address },
    CreateFile { path: String },
    CreateDir { path: String },
    DeleteFile { path: String },
    AddChunk {
        path: String,
        chunk_index: ChunkIndex,
        handle: ChunkHandle,
        replicas: Vec<Address>,
        handle_counter: ChunkHandle,
    },
}

impl OpRecord {
    fn action_code(&self) -> &'static str {
        match self {
            OpRecord::GrantClientId { .. } => "GRANT_CLIENT_ID",
            OpRecord::NotifyMaster { .. } => "NOTIFY_MASTER",
            OpRecord::CreateFile { .. } => "CREATE_FILE",
            OpRecord::CreateDir { .. } => "CREATE_DIR",
            OpRecord::DeleteFile { .. } => "DELETE_FILE",
            OpRecord::AddChunk { .. } => "ADD_CHUNK",
        }
    }
}

/// Append-only, single-writer log file.
pub struct OperationLog {
    file: Mutex<File>,
}

impl OperationLog {
    /// Opens (creating if absent) the log file for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .with_context(|| format!("unable to open operation log at {:?}", path.as_ref()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one record before the in-memory mutation is considered
    /// committed to the caller (spec.md §4.3 write policy).
    pub fn append(&self, record: &OpRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let line = encode_line(record.action_code(), &payload);
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Reads every well-formed line from `path` in order. A missing file
    /// is treated as empty state; corrupt/unknown lines are logged and
    /// skipped without aborting recovery (spec.md §7).
    pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<OpRecord>> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).context("unable to open operation log for replay"),
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(err) => {
                    log::warn!("operation log line {lineno}: read error {err}, skipping");
                    continue;
                }
            };
            let Some((_code, payload)) = parse_line(&line) else {
                if !line.trim().is_empty() {
                    log::warn!("operation log line {lineno}: malformed, skipping");
                }
                continue;
            };
            match serde_json::from_str::<OpRecord>(payload) {
                Ok(record) => records.push(record),
                Err(err) => log::warn!("operation log line {lineno}: {err}, skipping"),
            }
        }
        Ok(records)
    }
}

pub fn default_log_path(master_addr: &str) -> PathBuf {
    PathBuf::from(format!("master_meta_{}.log", master_addr.replace([':', '/'], "_")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_missing_file_is_empty() {
        let records = OperationLog::replay("/nonexistent/path/does/not/exist.log").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn append_then_replay_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oplog");
        {
            let log = OperationLog::open(&path).unwrap();
            log.append(&OpRecord::CreateDir { path: "/".into() }).unwrap();
            log.append(&OpRecord::CreateFile {
                path: "/a".into(),
            })
            .unwrap();
            log.append(&OpRecord::AddChunk {
                path: "/a".into(),
                chunk_index: 0,
                handle: 1,
                replicas: vec!["127.0.0.1:9001".into()],
                handle_counter: 1,
            })
            .unwrap();
        }

        let records = OperationLog::replay(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], OpRecord::CreateDir { path: "/".into() });
        assert_eq!(
            records[2],
            OpRecord::AddChunk {
                path: "/a".into(),
                chunk_index: 0,
                handle: 1,
                replicas: vec!["127.0.0.1:9001".into()],
                handle_counter: 1,
            }
        );
    }

    #[test]
    fn skips_malformed_lines_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oplog");
        std::fs::write(&path, "garbage-without-separator\nCREATE_DIR|||\"/\"\n").unwrap();
        let records = OperationLog::replay(&path).unwrap();
        assert_eq!(records, vec![OpRecord::CreateDir { path: "/".into() }]);
    }
}
