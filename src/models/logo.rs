use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// Accepted logo extensions, highest priority first. All support transparency.
const LOGO_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
];

/// The logo placed over detected license plates.
///
/// Resolved once per run and shared read-only by every task; the bytes are
/// read from disk for each submission.
#[derive(Debug, Clone)]
pub struct LogoAsset {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: &'static str,
}

impl LogoAsset {
    /// Find the logo in `dir`: files are scanned in name order and the first
    /// one with the highest-priority extension wins.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let missing = || ConfigError::MissingLogo(dir.to_path_buf());

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|_| missing())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        for (ext, mime_type) in LOGO_EXTENSIONS {
            let found = files.iter().find(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            });

            if let Some(path) = found {
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("logo")
                    .to_string();
                tracing::info!(logo = %path.display(), "Using logo asset");
                return Ok(Self {
                    path: path.clone(),
                    file_name,
                    mime_type,
                });
            }
        }

        Err(missing())
    }

    /// Read the logo bytes for one submission.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}
