// ABOUTME: File-backed checkpoint store: one JSON envelope per key in a state directory.
// ABOUTME: Uses atomic create_new for put_if_absent and write-then-rename for put.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;

use super::error::{CorruptSnafu, CreateDirSnafu, EncodeSnafu, ReadSnafu, RemoveSnafu, WriteSnafu};
use super::{CheckpointStore, StoreError, expires_at};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    expires_at: DateTime<Utc>,
    value: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .context(CreateDirSnafu { path: dir.clone() })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_name(key)))
    }

    fn encode(key: &str, value: &str, ttl: Duration) -> Result<Vec<u8>, StoreError> {
        let envelope = Envelope {
            key: key.to_string(),
            expires_at: expires_at(ttl),
            value: value.to_string(),
        };
        serde_json::to_vec(&envelope).context(EncodeSnafu { key })
    }

    /// Read a live envelope, removing it if it has expired.
    async fn read_live(&self, key: &str) -> Result<Option<Envelope>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(ReadSnafu { path }),
        };

        let envelope: Envelope = serde_json::from_slice(&bytes).context(CorruptSnafu { key })?;
        if envelope.expires_at <= Utc::now() {
            tracing::debug!(key, "Removing expired entry");
            remove_if_present(&path).await?;
            return Ok(None);
        }
        Ok(Some(envelope))
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        let bytes = Self::encode(key, value, ttl)?;

        tokio::fs::write(&tmp, bytes)
            .await
            .context(WriteSnafu { path: tmp.clone() })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .context(WriteSnafu { path })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_live(key).await?.map(|e| e.value))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        let bytes = Self::encode(key, value, ttl)?;

        // Second attempt only happens after an expired entry was cleared.
        for _ in 0..2 {
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(&bytes)
                        .await
                        .context(WriteSnafu { path: path.clone() })?;
                    file.flush()
                        .await
                        .context(WriteSnafu { path: path.clone() })?;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    match self.read_live(key).await {
                        Ok(Some(_)) => return Ok(false),
                        Ok(None) => continue,
                        Err(e) if e.kind() == super::StoreErrorKind::Corrupt => return Ok(false),
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e).context(WriteSnafu { path }),
            }
        }
        Ok(false)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        remove_if_present(&self.path_for(key)).await
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(RemoveSnafu { path }),
    }
}

/// Escape a key into a portable file name. Reversible, so distinct keys
/// never share a file.
fn file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("_{byte:02x}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_escape_separators() {
        assert_eq!(file_name("deployment:abc"), "deployment_3aabc");
        assert_ne!(file_name("a:b"), file_name("a_b"));
    }
}
