use crate::config::ReportConfig;
use crate::error::{GgrReportError, Result};
use crate::registry::LatestFileRegistry;
use crate::workbook::{read_workbook_sheet, workbook_sheet_names, RawSheet, SheetSelector};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSummary {
    pub file_name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub message: String,
}

/// A workbook resolved to a concrete file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUpload {
    pub name: String,
    pub path: PathBuf,
}

/// Filesystem areas used by the pipeline, plus the latest-upload registry.
///
/// Readers (report generation, chart rendering, uploads) hold the fence shared;
/// [`Storage::clear_all`] holds it exclusively, so cleanup never deletes files in use.
#[derive(Debug)]
pub struct Storage {
    upload_dir: PathBuf,
    plots_dir: PathBuf,
    reports_dir: PathBuf,
    data_dir: PathBuf,
    header_row: usize,
    registry: LatestFileRegistry,
    fence: RwLock<()>,
}

impl Storage {
    pub fn open(config: &ReportConfig) -> Result<Self> {
        for dir in [
            &config.upload_dir,
            &config.plots_dir,
            &config.reports_dir,
            &config.data_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        Ok(Self {
            registry: LatestFileRegistry::open(&config.upload_dir),
            upload_dir: config.upload_dir.clone(),
            plots_dir: config.plots_dir.clone(),
            reports_dir: config.reports_dir.clone(),
            data_dir: config.data_dir.clone(),
            header_row: config.header_row,
            fence: RwLock::new(()),
        })
    }

    pub fn registry(&self) -> &LatestFileRegistry {
        &self.registry
    }

    pub fn plots_dir(&self) -> &Path {
        &self.plots_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn header_row(&self) -> usize {
        self.header_row
    }

    /// Shared side of the cleanup fence. Hold it for as long as files are being read or written.
    pub fn shared_access(&self) -> RwLockReadGuard<'_, ()> {
        self.fence
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn exclusive_access(&self) -> RwLockWriteGuard<'_, ()> {
        self.fence
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores an uploaded workbook and makes it the latest file once it parses.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadSummary> {
        let _guard = self.shared_access();

        let name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GgrReportError::WorkbookError(format!("invalid upload file name '{}'", file_name))
            })?;
        let path = self.upload_dir.join(&name);
        if self.registry.is_marker(&path) {
            return Err(GgrReportError::WorkbookError(format!(
                "'{}' is a reserved file name",
                name
            )));
        }

        fs::write(&path, bytes)?;
        info!("Saved upload {} ({} bytes)", path.display(), bytes.len());

        let parsed = read_workbook_sheet(&path, &SheetSelector::First, 0);
        let sheet = match parsed {
            Ok(sheet) => sheet,
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&path) {
                    warn!("Failed to delete {}: {}", path.display(), remove_err);
                }
                return Err(e);
            }
        };

        self.registry.set(&name)?;

        Ok(UploadSummary {
            message: format!(
                "File parsed: {} rows, {} columns",
                sheet.len(),
                sheet.columns.len()
            ),
            rows: sheet.len(),
            columns: sheet.columns.len(),
            file_name: name,
            path,
        })
    }

    /// Resolves an explicit file name, or the latest upload when none is given.
    pub fn resolve(&self, file_name: Option<&str>) -> Result<ResolvedUpload> {
        let name = match file_name {
            Some(name) => name.to_string(),
            None => self
                .registry
                .get()
                .ok_or_else(|| GgrReportError::NotFound("No file has been uploaded yet.".to_string()))?,
        };

        let path = self.upload_dir.join(&name);
        if !path.is_file() {
            return Err(GgrReportError::NotFound(format!(
                "{} not found in {}",
                name,
                self.upload_dir.display()
            )));
        }

        Ok(ResolvedUpload { name, path })
    }

    pub fn sheet_names(&self, file_name: Option<&str>) -> Result<Vec<String>> {
        let resolved = self.resolve(file_name)?;
        workbook_sheet_names(&resolved.path)
    }

    pub fn read_sheet(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<RawSheet> {
        let resolved = self.resolve(file_name)?;
        read_workbook_sheet(&resolved.path, &SheetSelector::from_name(sheet), self.header_row)
    }

    /// Empties every storage area and forgets the latest upload. Returns the number of
    /// entries removed; entries that cannot be deleted are logged and left in place.
    pub fn clear_all(&self) -> usize {
        let _guard = self.exclusive_access();

        let mut removed = 0;
        for dir in [
            &self.data_dir,
            &self.plots_dir,
            &self.reports_dir,
            &self.upload_dir,
        ] {
            removed += clear_directory(dir);
        }
        self.registry.clear();

        info!("Cleanup job completed, {} entries removed", removed);
        removed
    }
}

fn clear_directory(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let outcome = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        match outcome {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }
    removed
}
