use crate::capture::Frame;
use crate::error::{Error, Result};
use log::debug;
use std::path::{Path, PathBuf};

/// Writes confirmed frames to disk as JPEG files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `frame` as `<plate>_<capture time>.jpg` and return its path
    pub async fn save(&self, plate: &str, frame: &Frame) -> Result<PathBuf> {
        let file_name = format!(
            "{}_{}.jpg",
            plate,
            frame.captured_at.format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.dir.join(file_name);

        let dir = self.dir.clone();
        let target = path.clone();
        let image = frame.image.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            image.save(&target)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Io(format!("Snapshot task failed: {}", e)))??;

        debug!("Saved snapshot {}", path.display());
        Ok(path)
    }
}
