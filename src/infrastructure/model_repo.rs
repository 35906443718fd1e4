use crate::domain::model::ModelHandle;
use crate::domain::ports::ModelRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

/// Persists each model version as one JSON document. Saves overwrite, so a
/// status change (retire, rollback) rewrites that version's file in place.
pub struct JsonModelRepository {
    dir: PathBuf,
}

impl JsonModelRepository {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, version: u64) -> PathBuf {
        self.dir.join(format!("model_v{version}.json"))
    }
}

#[async_trait]
impl ModelRepository for JsonModelRepository {
    async fn save(&self, handle: &ModelHandle) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating model dir {}", self.dir.display()))?;
        let path = self.path_for(handle.version);
        let json = serde_json::to_vec_pretty(handle)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ModelHandle>> {
        let mut handles = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // A missing directory is a fresh install, not an error.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(handles),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", self.dir.display()));
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_slice::<ModelHandle>(&bytes) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!(%err, path = %path.display(), "skipping unreadable model file");
                }
            }
        }
        handles.sort_by_key(|h| h.version);
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ModelHandle, ModelStatus};
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("decisivis-models-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = scratch_dir();
        let repo = JsonModelRepository::new(dir.clone());

        let mut first = ModelHandle::neutral();
        first.accuracy = 0.7;
        let mut second = ModelHandle::neutral();
        second.version = 3;
        second.status = ModelStatus::Retired;

        repo.save(&second).await.unwrap();
        repo.save(&first).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], first);
        assert_eq!(loaded[1], second);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_an_empty_repository() {
        let repo = JsonModelRepository::new(scratch_dir());
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let dir = scratch_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("model_v9.json"), b"not json")
            .await
            .unwrap();
        let repo = JsonModelRepository::new(dir.clone());
        assert!(repo.load_all().await.unwrap().is_empty());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
