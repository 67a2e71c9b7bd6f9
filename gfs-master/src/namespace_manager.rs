//! Flat string-keyed namespace (spec.md §4.1). A single mutex protects the
//! whole map; every mutating operation appends its operation-log entry
//! before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gfs_types::GfsError;

use crate::operation_log::{OpRecord, OperationLog};

#[derive(Debug, Clone)]
pub struct PathEntry {
    pub is_dir: bool,
    pub length: u64,
}

pub struct NamespaceManager {
    oplog: Arc<OperationLog>,
    entries: Mutex<HashMap<String, PathEntry>>,
}

/// Longest proper prefix of `path` ending at a `/`, or `None` for the root.
fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(trimmed[..idx].to_string())
    }
}

impl NamespaceManager {
    /// Builds an empty namespace (just the root) and applies `records`
    /// replayed from the operation log on top of it.
    pub fn new(oplog: Arc<OperationLog>, records: &[OpRecord]) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "/".to_string(),
            PathEntry {
                is_dir: true,
                length: 0,
            },
        );

        let manager = Self {
            oplog,
            entries: Mutex::new(entries),
        };
        manager.replay(records);
        manager
    }

    fn replay(&self, records: &[OpRecord]) {
        let mut entries = self.entries.lock().unwrap();
        for record in records {
            match record {
                OpRecord::CreateFile { path } => {
                    entries.insert(
                        path.clone(),
                        PathEntry {
                            is_dir: false,
                            length: 0,
                        },
                    );
                }
                OpRecord::CreateDir { path } => {
                    entries.insert(
                        path.clone(),
                        PathEntry {
                            is_dir: true,
                            length: 0,
                        },
                    );
                }
                OpRecord::DeleteFile { path } => {
                    entries.remove(path);
                }
                _ => {}
            }
        }
    }

    fn check_parent(entries: &HashMap<String, PathEntry>, path: &str) -> Result<(), GfsError> {
        if path == "/" {
            return Ok(());
        }
        let parent = parent_of(path).unwrap_or_else(|| "/".to_string());
        match entries.get(&parent) {
            None => Err(GfsError::PathNotFound(parent)),
            Some(entry) if !entry.is_dir => Err(GfsError::ParentIsNotDir(parent)),
            Some(_) => Ok(()),
        }
    }

    pub fn create(&self, path: &str) -> Result<(), GfsError> {
        let mut entries = self.entries.lock().unwrap();
        Self::check_parent(&entries, path)?;
        if entries.contains_key(path) {
            return Err(GfsError::FileAlreadyExists(path.to_string()));
        }
        self.oplog
            .append(&OpRecord::CreateFile {
                path: path.to_string(),
            })
            .map_err(|e| GfsError::Other(e.to_string()))?;
        entries.insert(
            path.to_string(),
            PathEntry {
                is_dir: false,
                length: 0,
            },
        );
        Ok(())
    }

    pub fn create_dir(&self, path: &str) -> Result<(), GfsError> {
        let mut entries = self.entries.lock().unwrap();
        Self::check_parent(&entries, path)?;
        if entries.contains_key(path) {
            return Err(GfsError::DirAlreadyExists(path.to_string()));
        }
        self.oplog
            .append(&OpRecord::CreateDir {
                path: path.to_string(),
            })
            .map_err(|e| GfsError::Other(e.to_string()))?;
        entries.insert(
            path.to_string(),
            PathEntry {
                is_dir: true,
                length: 0,
            },
        );
        Ok(())
    }

    pub fn list(&self, path: &str) -> Result<Vec<(String, PathEntry)>, GfsError> {
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            None => return Err(GfsError::PathNotFound(path.to_string())),
            Some(entry) if !entry.is_dir => return Err(GfsError::ParentIsNotDir(path.to_string())),
            Some(_) => {}
        }

        let prefix = if path == "/" { "/".to_string() } else { path.to_string() };
        let children = entries
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && parent_of(p).as_deref() == Some(prefix.as_str()))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        Ok(children)
    }

    /// Deletes `path`, refusing non-existent paths and non-empty
    /// directories. Returns `true` if the deleted entry was a file (so the
    /// caller can hand its chunks to the garbage set).
    pub fn delete(&self, path: &str) -> Result<bool, GfsError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get(path)
            .ok_or_else(|| GfsError::PathNotFound(path.to_string()))?;

        if entry.is_dir {
            let has_children = entries
                .keys()
                .any(|p| p.as_str() != "/" && parent_of(p).as_deref() == Some(path));
            if has_children {
                return Err(GfsError::DirIsNotEmpty(path.to_string()));
            }
        }
        let was_file = !entry.is_dir;

        self.oplog
            .append(&OpRecord::DeleteFile {
                path: path.to_string(),
            })
            .map_err(|e| GfsError::Other(e.to_string()))?;
        entries.remove(path);
        Ok(was_file)
    }

    pub fn get_file_length(&self, path: &str) -> Result<u64, GfsError> {
        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(path)
            .ok_or_else(|| GfsError::FileNotFound(path.to_string()))?;
        Ok(entry.length)
    }

    /// The only writer of file length: called from `report_chunk` when a
    /// chunk server reports that a chunk grew (spec.md §4.1).
    pub fn set_file_length(&self, path: &str, length: u64) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(path) {
            if length > entry.length {
                entry.length = length;
            }
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> NamespaceManager {
        let dir = tempfile::tempdir().unwrap();
        let oplog = Arc::new(OperationLog::open(dir.path().join("oplog")).unwrap());
        NamespaceManager::new(oplog, &[])
    }

    #[test]
    fn create_requires_existing_dir_parent() {
        let ns = manager();
        assert!(matches!(
            ns.create("/missing/file"),
            Err(GfsError::PathNotFound(_))
        ));
    }

    #[test]
    fn create_then_list_then_delete() {
        let ns = manager();
        ns.create_dir("/x").unwrap();
        ns.create("/x/y").unwrap();

        let listed = ns.list("/x").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "/x/y");

        assert!(matches!(ns.delete("/x"), Err(GfsError::DirIsNotEmpty(_))));
        ns.delete("/x/y").unwrap();
        ns.delete("/x").unwrap();
        assert!(!ns.exists("/x"));
    }

    #[test]
    fn create_delete_create_succeeds() {
        let ns = manager();
        ns.create("/a").unwrap();
        ns.delete("/a").unwrap();
        ns.create("/a").unwrap();
    }

    #[test]
    fn duplicate_create_fails() {
        let ns = manager();
        ns.create("/a").unwrap();
        assert!(matches!(
            ns.create("/a"),
            Err(GfsError::FileAlreadyExists(_))
        ));
    }

    #[test]
    fn create_under_file_parent_fails() {
        let ns = manager();
        ns.create("/a").unwrap();
        assert!(matches!(
            ns.create("/a/b"),
            Err(GfsError::ParentIsNotDir(_))
        ));
    }
}
