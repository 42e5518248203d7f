//! Persisted feed offset.
//!
//! The offset is stored as a single `key=value` property so the file stays
//! hand-editable. Writes go to a sibling temp file first and are renamed
//! into place.

use std::path::{Path, PathBuf};

use crate::error::StateError;

/// Property key holding the number of valid feed lines already consumed.
pub const OFFSET_KEY: &str = "last_processed_offset";

const FILE_NAME: &str = "blacklist_state.properties";

/// Default location: `<data dir>/netmonitor/blacklist_state.properties`,
/// or the working directory when the platform has no data dir.
#[must_use]
pub fn default_state_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from(FILE_NAME),
        |dir| dir.join("netmonitor").join(FILE_NAME),
    )
}

/// Read the offset out of properties-formatted `content`.
///
/// Lines starting with `#` or `!` are comments. Both `=` and `:` separate
/// key from value.
#[must_use]
pub fn parse_offset(content: &str) -> Option<u64> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(['#', '!']))
        .filter_map(|line| line.split_once(['=', ':']))
        .find(|(key, _)| key.trim() == OFFSET_KEY)
        .and_then(|(_, value)| value.trim().parse().ok())
}

fn render(offset: u64) -> String {
    format!("#netmonitor blacklist sync state\n{OFFSET_KEY}={offset}\n")
}

/// File-backed store for the feed offset.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved offset. A missing or unreadable file yields 0.
    pub async fn load(&self) -> u64 {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_offset(&content).unwrap_or_else(|| {
                tracing::warn!(path = %self.path.display(), "sync state file has no valid offset, starting from 0");
                0
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no sync state file, starting from 0");
                0
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read sync state, starting from 0");
                0
            }
        }
    }

    /// Persist `offset`, replacing the previous value atomically.
    pub async fn save(&self, offset: u64) -> Result<(), StateError> {
        let io_err = |source: std::io::Error| StateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, render(offset)).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        tracing::debug!(offset, path = %self.path.display(), "saved sync state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn should_parse_offset_ignoring_comments() {
        let content = "#comment\n! other comment\n\nlast_processed_offset=150\n";
        assert_eq!(parse_offset(content), Some(150));
    }

    #[test]
    fn should_parse_offset_with_colon_and_spaces() {
        assert_eq!(parse_offset("last_processed_offset : 7"), Some(7));
    }

    #[test]
    fn should_return_none_for_corrupt_value() {
        assert_eq!(parse_offset("last_processed_offset=abc"), None);
        assert_eq!(parse_offset("last_processed_offset=-3"), None);
        assert_eq!(parse_offset("other=5"), None);
    }

    #[test]
    fn should_default_path_to_properties_file() {
        assert!(default_state_path().ends_with(FILE_NAME));
    }

    #[tokio::test]
    async fn should_load_zero_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path().join("state.properties"));

        assert_eq!(store.load().await, 0);
    }

    #[tokio::test]
    async fn should_load_zero_when_file_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.properties");
        std::fs::write(&path, "garbage").unwrap();

        assert_eq!(SyncStateStore::new(path).load().await, 0);
    }

    #[tokio::test]
    async fn should_round_trip_offset() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path().join("nested/state.properties"));

        store.save(50).await.unwrap();
        assert_eq!(store.load().await, 50);

        store.save(100).await.unwrap();
        assert_eq!(store.load().await, 100);

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("last_processed_offset=100"));
    }

    #[tokio::test]
    async fn should_not_leave_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path().join("state.properties"));

        store.save(3).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("state.properties")]);
    }
}
