use crate::domain::ServiceState;
use crate::error::PersistenceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable storage for per-service state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when no record exists yet
    async fn load(&self, service_id: &str) -> Result<Option<ServiceState>, PersistenceError>;

    async fn save(&self, service_id: &str, state: &ServiceState) -> Result<(), PersistenceError>;
}

/// One JSON file per service under `<state_dir>/services/`
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: state_dir.as_ref().join("services"),
        }
    }

    pub fn path_for(&self, service_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", service_id))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, service_id: &str) -> Result<Option<ServiceState>, PersistenceError> {
        let path = self.path_for(service_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };

        let state = serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
            path: path.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    async fn save(&self, service_id: &str, state: &ServiceState) -> Result<(), PersistenceError> {
        let path = self.path_for(service_id);
        let content = serde_json::to_string_pretty(state)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        // Write to temp file first, then rename (atomic)
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(io_err(&temp_path))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(io_err(&path))?;

        debug!(service = %service_id, "State saved to {}", path.display());
        Ok(())
    }
}
