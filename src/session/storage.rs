use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{Instance, InstanceId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredState {
    instances: Vec<Instance>,
    /// Action kinds whose one-time help screen has been dismissed.
    #[serde(default)]
    help_seen: Vec<String>,
}

/// On-disk persistence for instances and one-time help flags.
///
/// Plain JSON under the data directory; load-or-default so a missing or
/// corrupt file never blocks startup.
#[derive(Clone)]
pub struct InstanceStorage {
    state_path: PathBuf,
}

impl InstanceStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            state_path: base_dir.join("state.json"),
        }
    }

    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("corral")
    }

    async fn load_state(&self) -> StoredState {
        match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Corrupt state file, starting fresh: {}", e);
                StoredState::default()
            }),
            Err(_) => StoredState::default(),
        }
    }

    async fn save_state(&self, state: &StoredState) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create state directory")?;
        }
        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        tokio::fs::write(&self.state_path, json)
            .await
            .with_context(|| format!("Failed to write {:?}", self.state_path))?;
        Ok(())
    }

    pub async fn load_instances(&self) -> Vec<Instance> {
        self.load_state().await.instances
    }

    pub async fn save_instances(&self, instances: &[Instance]) -> Result<()> {
        let mut state = self.load_state().await;
        state.instances = instances.to_vec();
        self.save_state(&state).await
    }

    pub async fn delete_instance(&self, id: InstanceId) -> Result<()> {
        let mut state = self.load_state().await;
        state.instances.retain(|i| i.id != id);
        self.save_state(&state).await
    }

    pub async fn help_seen(&self, kind: &str) -> bool {
        self.load_state()
            .await
            .help_seen
            .iter()
            .any(|k| k == kind)
    }

    pub async fn mark_help_seen(&self, kind: &str) -> Result<()> {
        let mut state = self.load_state().await;
        if !state.help_seen.iter().any(|k| k == kind) {
            state.help_seen.push(kind.to_string());
            self.save_state(&state).await?;
        }
        Ok(())
    }

    pub async fn wipe(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.state_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove state file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sample_instance(id: InstanceId) -> Instance {
        Instance::new(
            id,
            format!("instance {}", id),
            format!("branch-{}", id),
            PathBuf::from(format!("/tmp/wt-{}", id)),
            "claude".to_string(),
        )
    }

    #[tokio::test]
    async fn load_instances_empty_when_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InstanceStorage::new(tmp.path().to_path_buf());
        assert!(storage.load_instances().await.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InstanceStorage::new(tmp.path().to_path_buf());

        storage
            .save_instances(&[sample_instance(1), sample_instance(2)])
            .await
            .unwrap();

        let loaded = storage.load_instances().await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 1);
        assert_eq!(loaded[1].branch, "branch-2");
    }

    #[tokio::test]
    async fn delete_instance_removes_only_that_id() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InstanceStorage::new(tmp.path().to_path_buf());
        storage
            .save_instances(&[sample_instance(1), sample_instance(2)])
            .await
            .unwrap();

        storage.delete_instance(1).await.unwrap();

        let loaded = storage.load_instances().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 2, "delete_instance: should keep other ids");
    }

    #[tokio::test]
    async fn help_seen_persists_per_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InstanceStorage::new(tmp.path().to_path_buf());

        assert!(!storage.help_seen("new").await);
        storage.mark_help_seen("new").await.unwrap();
        assert!(storage.help_seen("new").await);
        assert!(
            !storage.help_seen("new-with-prompt").await,
            "help_seen: kinds should be tracked independently"
        );
    }

    #[tokio::test]
    async fn mark_help_seen_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InstanceStorage::new(tmp.path().to_path_buf());
        storage.mark_help_seen("new").await.unwrap();
        storage.mark_help_seen("new").await.unwrap();

        let state = storage.load_state().await;
        assert_eq!(state.help_seen.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_default() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InstanceStorage::new(tmp.path().to_path_buf());
        tokio::fs::write(tmp.path().join("state.json"), "{ not json")
            .await
            .unwrap();
        assert!(storage.load_instances().await.is_empty());
    }

    #[tokio::test]
    async fn wipe_missing_file_is_ok() {
        let storage = InstanceStorage::new(Path::new("/tmp/corral-missing-dir-xyz").to_path_buf());
        assert!(storage.wipe().await.is_ok());
    }
}
