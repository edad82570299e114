use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use super::{Backend, Store, StoreError};
use crate::cache::key::{KeyDeriver, KeyError, fingerprint};
use crate::http::Request;
use crate::http::codec::encode_request;

const RESPONSE_FILE: &str = "response.txt";
const REQUEST_FILE: &str = "request.txt";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A store that keeps one directory per key under a base directory.
///
/// Each entry lives at `<base>/<key>/response.txt` as a raw HTTP response,
/// so the cache can be read and edited by hand. With
/// [`dump_requests`](Self::dump_requests) enabled, the request that produced
/// a key is written next to it as `request.txt` when the key is derived.
///
/// File entries never expire.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
    dump_requests: bool,
}

impl FileStore {
    /// Creates a store rooted at `base_dir`.
    ///
    /// # Arguments
    ///
    /// - `base_dir`: Directory holding one subdirectory per key. It and the
    ///   key directories are created on the first write, not here.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use httpc::{CacheMiddleware, FileStore, Pipeline};
    ///
    /// let store = FileStore::new("/var/cache/httpc").dump_requests(true);
    /// let pipeline = Pipeline::new().with(CacheMiddleware::new(store));
    /// ```
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            dump_requests: false,
        }
    }

    /// Also writes each request to `<base>/<key>/request.txt`.
    ///
    /// The dump is written while the key is derived. A dump that cannot be
    /// written is logged and skipped; the key is still returned.
    #[must_use]
    pub fn dump_requests(mut self, enabled: bool) -> Self {
        self.dump_requests = enabled;
        self
    }

    /// Returns the directory the store was created with.
    ///
    /// # Returns
    ///
    /// The base path as given to [`new`](Self::new), unresolved. It may not
    /// exist yet if nothing has been written.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the response file for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if `key` is empty or could escape
    /// the base directory (`..`, `/` or `\\`).
    pub fn response_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.entry_dir(key)?.join(RESPONSE_FILE))
    }

    /// Path of the request dump for `key`.
    pub fn request_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.entry_dir(key)?.join(REQUEST_FILE))
    }

    fn entry_dir(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key == "."
            || key.contains("..")
            || key.contains(['/', '\\'])
        {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        Ok(self.base_dir.join(key))
    }
}

/// Writes through a sibling temp file so readers never see a partial entry.
///
/// Each call gets its own temp name, so concurrent writers of one path never
/// share a file; the last rename wins.
async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let tmp = tmp_path(path);
    if let Err(e) = write_then_rename(&tmp, path, data).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

async fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, data).await?;
    fs::rename(tmp, path).await
}

fn tmp_path(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{n}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.response_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let path = self.response_path(key)?;
        write_file(&path, &value).await?;
        debug!(path = %path.display(), "wrote cache file");
        Ok(())
    }
}

#[async_trait]
impl KeyDeriver for FileStore {
    async fn derive_key(&self, request: &Request) -> Result<String, KeyError> {
        let key = fingerprint(request);
        if self.dump_requests {
            if let Err(e) = self.dump_request(&key, request).await {
                warn!(%key, error = %e, "failed to dump request");
            }
        }
        Ok(key)
    }
}

impl FileStore {
    async fn dump_request(&self, key: &str, request: &Request) -> Result<(), KeyError> {
        let path = self
            .request_path(key)
            .map_err(|e| KeyError::Other(e.to_string()))?;
        write_file(&path, &encode_request(request)?).await?;
        debug!(path = %path.display(), "dumped request");
        Ok(())
    }
}

impl From<FileStore> for Backend {
    fn from(store: FileStore) -> Self {
        let keys = store.clone();
        Backend::new(store).with_key_deriver(keys)
    }
}
