use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::AppError;
use crate::loader::SourceFormat;

/// Supported documents found directly inside the input folder.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Sorted by file name.
    pub documents: Vec<PathBuf>,
    /// Files with an unsupported suffix.
    pub ignored: usize,
}

/// Lists `.pdf`, `.docx` and `.txt` files in `dir` (non-recursive).
pub fn discover(dir: &Path) -> Result<Discovery, AppError> {
    let meta = std::fs::metadata(dir).map_err(|e| AppError::InputFolder {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(AppError::InputFolder {
            path: dir.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut discovery = Discovery::default();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if SourceFormat::from_path(entry.path()).is_some() {
            discovery.documents.push(entry.into_path());
        } else {
            debug!("Ignoring unsupported file {}", entry.path().display());
            discovery.ignored += 1;
        }
    }

    Ok(discovery)
}
