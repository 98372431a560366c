//! Directory-backed cache.
//!
//! Each key is stored in its own file under a two-character shard directory:
//!
//! ```text
//! <root>/<key[..2] with '.' as '_'>/<key>
//! ```
//!
//! A file holds a bincode record carrying the key next to the bytes, so a
//! renamed or truncated file is reported instead of returned as a hit.

use crate::error::{LdictError, Result};
use crate::persistence::Cache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    data: Vec<u8>,
}

pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "opened disk cache");
        Ok(DiskCache { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = key.len() >= 2
            && key != ".."
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_');
        if !valid {
            return Err(LdictError::Cache(format!("unusable cache key {key:?}")));
        }
        let shard = key[..2].replace('.', "_");
        Ok(self.root.join(shard).join(key))
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| LdictError::Cache(e.to_string()))?;
            if entry.file_type().is_file() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }
}

impl Cache for DiskCache {
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: Record = bincode::deserialize(&raw)
            .map_err(|e| LdictError::Cache(format!("corrupt record {}: {e}", path.display())))?;
        if record.key != key {
            return Err(LdictError::Cache(format!(
                "record {} holds key {:?}",
                path.display(),
                record.key
            )));
        }
        Ok(Some(record.data))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = Record {
            key: key.to_string(),
            data: value.to_vec(),
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        // Staged at the root, which `keys` never lists.
        let tmp = self.root.join(format!(".{key}.tmp"));
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("disk({})", self.root.display())
    }
}
