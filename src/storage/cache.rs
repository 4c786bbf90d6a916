//! On-disk response cache.
//!
//! One file per fetched URL. The file name is the URL with every
//! non-alphanumeric character replaced by `_`; the presence of the file, not
//! its content, is the hit. An empty file records a permanent failure so the
//! URL is never refetched while the entry exists.
//!
//! Writes go to a uniquely named temp file and are renamed into place, so a
//! reader racing a writer sees either no entry or a complete one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// A cache lookup hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Previously fetched response body.
    Body(String),
    /// Recorded permanent failure; do not refetch.
    Failure,
}

/// Filesystem-backed response cache.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    /// Create a cache rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem-safe cache key for a resolved URL.
    pub fn cache_key(url: &str) -> String {
        url.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.root.join(Self::cache_key(url))
    }

    /// Look up a URL. `None` is a miss.
    pub async fn lookup(&self, url: &str) -> Result<Option<CacheEntry>> {
        match tokio::fs::read(self.entry_path(url)).await {
            Ok(bytes) if bytes.is_empty() => Ok(Some(CacheEntry::Failure)),
            Ok(bytes) => Ok(Some(CacheEntry::Body(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Persist a successful response body.
    pub async fn store(&self, url: &str, body: &str) -> Result<()> {
        self.write_atomic(&self.entry_path(url), body.as_bytes())
            .await
    }

    /// Record a permanent failure as an empty entry.
    pub async fn store_failure(&self, url: &str) -> Result<()> {
        self.write_atomic(&self.entry_path(url), b"").await
    }

    /// Write bytes atomically (unique temp file, then rename), so concurrent
    /// writers to the same key cannot leave a partial entry. Last writer wins.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let tmp = path.with_extension(format!("tmp{}", rand::random::<u32>()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "http://api.example.com/content/abc-123";

    #[test]
    fn cache_key_replaces_non_alphanumerics() {
        assert_eq!(
            ResponseCache::cache_key(URL),
            "http___api_example_com_content_abc_123"
        );
        assert_eq!(ResponseCache::cache_key("plain"), "plain");
    }

    #[tokio::test]
    async fn lookup_missing_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());

        assert_eq!(cache.lookup(URL).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_lookup_returns_body() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());

        cache.store(URL, "{\"id\":\"abc\"}").await.unwrap();
        assert_eq!(
            cache.lookup(URL).await.unwrap(),
            Some(CacheEntry::Body("{\"id\":\"abc\"}".into()))
        );
    }

    #[tokio::test]
    async fn failure_marker_is_a_distinguishable_hit() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());

        cache.store_failure(URL).await.unwrap();
        assert_eq!(cache.lookup(URL).await.unwrap(), Some(CacheEntry::Failure));
    }

    #[tokio::test]
    async fn last_writer_wins_on_same_key() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());

        cache.store_failure(URL).await.unwrap();
        cache.store(URL, "late body").await.unwrap();
        assert_eq!(
            cache.lookup(URL).await.unwrap(),
            Some(CacheEntry::Body("late body".into()))
        );
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());

        cache.store(URL, "body").await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
