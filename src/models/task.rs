use serde::Serialize;
use std::path::Path;
use strum::{Display, EnumString};

/// Lifecycle of one image as it moves through the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Submitted,
    Polling,
    Ready,
    Downloaded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Downloaded | TaskStatus::Failed)
    }
}

/// A single image being processed.
///
/// The `location` doubles as the job handle: the remote API keys status and
/// result lookups by the original image URL.
#[derive(Debug, Clone, Serialize)]
pub struct ImageTask {
    pub location: String,
    pub output_name: String,
    pub status: TaskStatus,
}

impl ImageTask {
    pub fn new(location: impl Into<String>) -> Self {
        let location = location.into();
        let output_name = derive_output_name(&location);
        Self {
            location,
            output_name,
            status: TaskStatus::Pending,
        }
    }

    /// Move to the next status. `Failed` is final; `Downloaded` can only
    /// fall to `Failed` when the result cannot be saved.
    pub fn advance(&mut self, next: TaskStatus) {
        let blocked = match self.status {
            TaskStatus::Failed => true,
            TaskStatus::Downloaded => next != TaskStatus::Failed,
            _ => false,
        };
        if blocked {
            return;
        }
        tracing::debug!(
            location = %self.location,
            from = %self.status,
            to = %next,
            "Task status changed"
        );
        self.status = next;
    }
}

/// Compute the output file stem for a location.
///
/// Download URLs carrying an `id` query parameter use that id; other URLs and
/// local paths use the file stem of the last path segment.
pub fn derive_output_name(location: &str) -> String {
    let raw = match reqwest::Url::parse(location) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            let id = url
                .query_pairs()
                .find(|(key, _)| key == "id")
                .map(|(_, value)| value.into_owned());
            id.unwrap_or_else(|| {
                url.path_segments()
                    .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
                    .map(|segment| file_stem(&segment))
                    .unwrap_or_default()
            })
        }
        _ => file_stem(location),
    };

    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "image".to_string()
    } else {
        sanitized
    }
}

/// Lowercased extension of a location's last path segment, if any.
pub fn source_extension(location: &str) -> Option<String> {
    let path = match reqwest::Url::parse(location) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url.path().to_string(),
        _ => location.to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn file_stem(segment: &str) -> String {
    Path::new(segment)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}
