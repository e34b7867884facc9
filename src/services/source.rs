//! Image source resolution
//!
//! Turns the configured image source into the list of locations handed to the
//! batch scheduler: local file paths, or direct-download URLs for every image
//! found in a shared cloud folder.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::{ConfigError, ImageSource};
use crate::services::snippet;

/// Used when a shared folder is private, unreachable or empty, so the
/// pipeline still has something to process.
pub const FALLBACK_LOCATIONS: [&str; 2] = [
    "https://images.unsplash.com/photo-1494976388531-d1058494cdd8?w=1200",
    "https://images.unsplash.com/photo-1503376780353-7e6692767b70?w=1200",
];

/// Input extensions accepted in local mode (compared case-insensitively).
pub const LOCAL_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

static FOLDER_REF_RE: OnceLock<Regex> = OnceLock::new();
static BARE_ID_RE: OnceLock<Regex> = OnceLock::new();
static FILE_REF_RE: OnceLock<Regex> = OnceLock::new();

fn folder_ref_re() -> &'static Regex {
    FOLDER_REF_RE.get_or_init(|| Regex::new(r"/folders/([A-Za-z0-9_-]+)").expect("valid regex"))
}

fn bare_id_re() -> &'static Regex {
    BARE_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").expect("valid regex"))
}

/// File references embedded in a folder listing page: `/file/d/<id>` links,
/// `data-id` attributes, `id=` query parameters and the `\x22<id>\x22`
/// escaped strings found in the page's inline scripts.
fn file_ref_re() -> &'static Regex {
    FILE_REF_RE.get_or_init(|| {
        Regex::new(concat!(
            r#"/file/d/([A-Za-z0-9_-]{25,})"#,
            r#"|data-id="([A-Za-z0-9_-]{25,})""#,
            r#"|[?&]id=([A-Za-z0-9_-]{25,})"#,
            r#"|\\x22([A-Za-z0-9_-]{33})\\x22"#,
        ))
        .expect("valid regex")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read input directory {path}: {source}")]
    LocalDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves an [`ImageSource`] into concrete image locations.
pub struct SourceResolver {
    http: reqwest::Client,
    origin: String,
}

impl SourceResolver {
    /// `origin` is the shared-folder host, e.g. `https://drive.google.com`.
    pub fn new(origin: &str, timeout: std::time::Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; plate-overlay/0.1)")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    pub async fn resolve(&self, source: &ImageSource) -> Result<Vec<String>, SourceError> {
        match source {
            ImageSource::Local(dir) => list_local_images(dir).await,
            ImageSource::SharedFolder(reference) => self.list_shared_folder(reference).await,
        }
    }

    /// List a shared folder. Only a malformed reference is an error; listing
    /// failures and empty folders degrade to [`FALLBACK_LOCATIONS`].
    pub async fn list_shared_folder(&self, reference: &str) -> Result<Vec<String>, SourceError> {
        let folder_id = parse_folder_id(reference)?;
        let listing_url = format!("{}/drive/folders/{}", self.origin, folder_id);

        tracing::info!(folder_id = %folder_id, "Fetching shared folder listing");

        let body = match self.fetch_listing(&listing_url).await {
            Ok(body) => body,
            Err(reason) => {
                tracing::warn!(
                    folder_id = %folder_id,
                    reason = %reason,
                    "Shared folder listing unavailable, using fallback sample images"
                );
                return Ok(fallback_locations());
            }
        };

        let ids = extract_file_ids(&body, &folder_id);
        if ids.is_empty() {
            tracing::warn!(
                folder_id = %folder_id,
                "No images found in shared folder, using fallback sample images"
            );
            return Ok(fallback_locations());
        }

        tracing::info!(folder_id = %folder_id, count = ids.len(), "Resolved shared folder images");
        Ok(ids.iter().map(|id| self.download_url(id)).collect())
    }

    pub fn download_url(&self, id: &str) -> String {
        format!("{}/uc?export=download&id={}", self.origin, id)
    }

    async fn fetch_listing(&self, url: &str) -> Result<String, String> {
        let response = self.http.get(url).send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, snippet(&body)));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

/// Image files in `dir` whose extension is jpg, jpeg or png.
///
/// Order follows directory enumeration and is not stable across platforms.
pub async fn list_local_images(dir: &Path) -> Result<Vec<String>, SourceError> {
    let local_err = |source| SourceError::LocalDir {
        path: dir.display().to_string(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(local_err)?;
    let mut locations = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(local_err)? {
        let path = entry.path();
        let accepted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                LOCAL_IMAGE_EXTENSIONS
                    .iter()
                    .any(|accepted| ext.eq_ignore_ascii_case(accepted))
            });

        if accepted && entry.file_type().await.map_err(local_err)?.is_file() {
            locations.push(path.display().to_string());
        }
    }

    tracing::info!(dir = %dir.display(), count = locations.len(), "Resolved local images");
    Ok(locations)
}

/// Extract the folder id from a `.../folders/<id>` URL or a bare id.
pub fn parse_folder_id(reference: &str) -> Result<String, ConfigError> {
    let reference = reference.trim();

    if let Some(caps) = folder_ref_re().captures(reference) {
        return Ok(caps[1].to_string());
    }
    if bare_id_re().is_match(reference) {
        return Ok(reference.to_string());
    }

    Err(ConfigError::MalformedFolderReference(reference.to_string()))
}

/// Distinct file ids referenced in a listing page, in first-seen order.
pub fn extract_file_ids(body: &str, folder_id: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for caps in file_ref_re().captures_iter(body) {
        let Some(id) = caps.iter().skip(1).flatten().next() else {
            continue;
        };
        let id = id.as_str();
        if id != folder_id && seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }

    ids
}

pub fn fallback_locations() -> Vec<String> {
    FALLBACK_LOCATIONS.iter().map(|s| s.to_string()).collect()
}
