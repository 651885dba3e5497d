//! Finding images to caption.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::SUPPORTED_FORMATS;

/// Expands a path into the image files beneath it.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    extensions: Vec<String>,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new(SUPPORTED_FORMATS.iter().copied())
    }
}

impl FileDiscovery {
    /// Accept files whose extension matches one of `extensions` (case-insensitive).
    pub fn new<'a>(extensions: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            extensions: extensions.into_iter().map(str::to_lowercase).collect(),
        }
    }

    /// A supported file yields itself; a directory is walked recursively.
    /// Results are sorted by path.
    pub fn discover(&self, path: &Path) -> Vec<PathBuf> {
        if path.is_file() {
            return if self.is_supported(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };
        }

        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
    }
}
