use crate::error::Result;
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const MARKER_FILE: &str = "latest.txt";

/// Remembers the most recently uploaded workbook.
///
/// Created once with its [`crate::Storage`] and mutated only by successful uploads.
/// The value is mirrored to `latest.txt` in the upload directory so it survives a restart.
#[derive(Debug)]
pub struct LatestFileRegistry {
    marker: PathBuf,
    current: RwLock<Option<String>>,
}

impl LatestFileRegistry {
    pub fn open(upload_dir: &Path) -> Self {
        let marker = upload_dir.join(MARKER_FILE);
        let current = match fs::read_to_string(&marker) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|name| !name.is_empty()),
            Err(_) => None,
        };

        Self {
            marker,
            current: RwLock::new(current),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, file_name: &str) -> Result<()> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::write(&self.marker, file_name)?;
        *current = Some(file_name.to_string());
        Ok(())
    }

    pub fn clear(&self) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.marker.exists() {
            if let Err(e) = fs::remove_file(&self.marker) {
                warn!("Failed to delete {}: {}", self.marker.display(), e);
            }
        }
        *current = None;
    }

    pub fn is_marker(&self, path: &Path) -> bool {
        path == self.marker
    }
}
