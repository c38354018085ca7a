use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Resume marker, stored as `{page, total_processed, last_card, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub page: u32,
    pub total_processed: u64,
    #[serde(default)]
    pub last_card: String,
    pub timestamp: DateTime<Utc>,
}

/// Owns the checkpoint file. Independent of the card store.
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointManager { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the checkpoint. Written to a sibling temp file then renamed,
    /// so a crash mid-write leaves the previous checkpoint intact.
    pub fn save(&self, page: u32, total_processed: u64, last_card: &str) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            page,
            total_processed,
            last_card: last_card.to_string(),
            timestamp: Utc::now(),
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&checkpoint)?;
        std::fs::write(&tmp, body).with_context(|| format!("Failed to write {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        debug!("Checkpoint saved: page {}, {} processed", page, total_processed);
        Ok(checkpoint)
    }

    /// Missing or unreadable checkpoints mean "start fresh".
    pub fn load(&self) -> Option<Checkpoint> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read checkpoint {:?}: {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_slice::<Checkpoint>(&raw) {
            Ok(cp) if cp.page >= 1 => {
                info!(
                    "Loaded checkpoint: page {}, {} processed, last card '{}'",
                    cp.page, cp.total_processed, cp.last_card
                );
                Some(cp)
            }
            Ok(cp) => {
                warn!("Ignoring checkpoint with page {}", cp.page);
                None
            }
            Err(e) => {
                warn!("Ignoring corrupt checkpoint {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", self.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, CheckpointManager) {
        let dir = tempfile::tempdir().unwrap();
        let cm = CheckpointManager::new(dir.path().join("nested").join("checkpoint.json"));
        (dir, cm)
    }

    #[test]
    fn missing_file_is_none() {
        let (_dir, cm) = manager();
        assert!(cm.load().is_none());
    }

    #[test]
    fn save_then_load() {
        let (_dir, cm) = manager();
        cm.save(3, 120, "Shock").unwrap();
        let cp = cm.save(4, 170, "Opt").unwrap();
        let loaded = cm.load().unwrap();
        assert_eq!(loaded, cp);
        assert_eq!(loaded.page, 4);
        assert!(!cm.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn json_layout() {
        let (_dir, cm) = manager();
        cm.save(2, 50, "Duress").unwrap();
        let v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(cm.path()).unwrap()).unwrap();
        assert_eq!(v["page"], 2);
        assert_eq!(v["total_processed"], 50);
        assert_eq!(v["last_card"], "Duress");
        assert!(v["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn corrupt_file_is_none() {
        let (_dir, cm) = manager();
        std::fs::create_dir_all(cm.path().parent().unwrap()).unwrap();
        std::fs::write(cm.path(), b"{\"page\": ").unwrap();
        assert!(cm.load().is_none());
        std::fs::write(cm.path(), br#"{"page":0,"total_processed":1,"timestamp":"2024-01-01T00:00:00Z"}"#)
            .unwrap();
        assert!(cm.load().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, cm) = manager();
        cm.save(1, 0, "").unwrap();
        cm.clear().unwrap();
        assert!(cm.load().is_none());
        cm.clear().unwrap();
    }
}
