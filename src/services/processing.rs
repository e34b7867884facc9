//! Processing client for the image-editing API
//!
//! One task per image: submit the image URL with the logo, poll the status
//! endpoint until the job is `ready`, fetch and decode the result, then write
//! it to the output directory.

use reqwest::{multipart, Client, Url};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::models::logo::LogoAsset;
use crate::models::task::{source_extension, ImageTask, TaskStatus};
use crate::services::decoder::{DecodeError, ResultDecoder};
use crate::services::scheduler::ProcessImage;
use crate::services::snippet;

/// Phase reported by the status endpoint once the result can be fetched.
pub const READY_PHASE: &str = "ready";

/// Settings the processing client needs, split out of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub api_token: String,
    pub cut_type: String,
    pub guideline_id: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub output_dir: PathBuf,
    pub output_suffix: String,
    pub min_image_bytes: usize,
    pub request_timeout: Duration,
}

impl From<&AppConfig> for ClientSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_base_url: config.api_base_url.clone(),
            api_token: config.api_token.clone(),
            cut_type: config.cut_type.clone(),
            guideline_id: config.guideline_id.clone(),
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
            output_dir: config.output_dir.clone(),
            output_suffix: config.output_suffix.clone(),
            min_image_bytes: config.min_image_bytes,
            request_timeout: config.request_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    data: Option<StatusData>,
}

#[derive(Deserialize)]
struct StatusData {
    #[serde(default)]
    images: Vec<StatusImage>,
}

#[derive(Deserialize)]
struct StatusImage {
    phase: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Job not ready after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid API endpoint URL: {0}")]
    Endpoint(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client for the submit/status/result endpoints of the image-editing API.
pub struct ProcessingClient {
    http: Client,
    settings: ClientSettings,
    logo: Arc<LogoAsset>,
    decoder: ResultDecoder,
}

impl ProcessingClient {
    pub fn new(mut settings: ClientSettings, logo: Arc<LogoAsset>) -> Result<Self, ProcessingError> {
        settings.api_base_url = settings.api_base_url.trim_end_matches('/').to_string();

        let http = Client::builder()
            .user_agent(concat!("plate-overlay/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()?;

        let decoder = ResultDecoder::new(
            http.clone(),
            settings.api_token.clone(),
            settings.min_image_bytes,
        );

        Ok(Self {
            http,
            settings,
            logo,
            decoder,
        })
    }

    /// Process one image end to end. Every failure is logged and reported as
    /// `false`; nothing propagates to sibling tasks.
    pub async fn process(&self, location: &str) -> bool {
        let mut task = ImageTask::new(location);
        let start = Instant::now();

        tracing::info!(location = %task.location, output = %task.output_name, "Processing image");

        let result = self.run(&mut task).await;
        let elapsed = start.elapsed();
        metrics::histogram!("plate_overlay_task_seconds").record(elapsed.as_secs_f64());

        match result {
            Ok(path) => {
                metrics::counter!("plate_overlay_tasks_succeeded_total").increment(1);
                tracing::info!(
                    location = %task.location,
                    output = %path.display(),
                    duration_ms = elapsed.as_millis(),
                    "Image processed"
                );
                true
            }
            Err(e) => {
                let stage = task.status;
                task.advance(TaskStatus::Failed);
                metrics::counter!("plate_overlay_tasks_failed_total").increment(1);
                match &e {
                    ProcessingError::Write { .. } => tracing::error!(
                        location = %task.location,
                        error = %e,
                        "Result downloaded but could not be saved"
                    ),
                    _ => tracing::error!(
                        location = %task.location,
                        stage = %stage,
                        error = %e,
                        "Image processing failed"
                    ),
                }
                false
            }
        }
    }

    async fn run(&self, task: &mut ImageTask) -> Result<PathBuf, ProcessingError> {
        self.submit(&task.location).await?;
        task.advance(TaskStatus::Submitted);

        task.advance(TaskStatus::Polling);
        let attempts = self.wait_until_ready(&task.location).await?;
        task.advance(TaskStatus::Ready);
        tracing::debug!(location = %task.location, attempts, "Job ready");

        let url = self.endpoint("result", &task.location)?;
        let bytes = self.decoder.fetch(url.as_str()).await?;
        task.advance(TaskStatus::Downloaded);

        self.write_output(task, &bytes).await
    }

    /// Submit one image. Any 2xx response counts as accepted; the body is
    /// not inspected.
    pub async fn submit(&self, location: &str) -> Result<(), ProcessingError> {
        let logo_bytes = self.logo.read().await.map_err(|e| {
            ProcessingError::Submission(format!(
                "could not read logo {}: {e}",
                self.logo.path.display()
            ))
        })?;

        let logo_part = multipart::Part::bytes(logo_bytes)
            .file_name(self.logo.file_name.clone())
            .mime_str(self.logo.mime_type)
            .map_err(|e| ProcessingError::Submission(e.to_string()))?;

        let form = multipart::Form::new()
            .text("image_url", location.to_string())
            .text("cut_type", self.settings.cut_type.clone())
            .text("guideline_id", self.settings.guideline_id.clone())
            .part("license_plate", logo_part);

        let response = self
            .http
            .post(format!("{}/submission", self.settings.api_base_url))
            .bearer_auth(&self.settings.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProcessingError::Submission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessingError::Submission(format!(
                "HTTP {}: {}",
                status,
                snippet(&body)
            )));
        }

        tracing::debug!(location = %location, status = %status, "Submission accepted");
        Ok(())
    }

    /// Poll the status endpoint until the phase is `ready`.
    ///
    /// Errors while polling count as "not ready yet". Returns the number of
    /// status queries issued; after `max_poll_attempts` queries the task
    /// times out.
    pub async fn wait_until_ready(&self, location: &str) -> Result<u32, ProcessingError> {
        let max_attempts = self.settings.max_poll_attempts;

        for attempt in 1..=max_attempts {
            metrics::counter!("plate_overlay_poll_attempts_total").increment(1);

            match self.query_phase(location).await {
                Ok(Some(phase)) if phase == READY_PHASE => return Ok(attempt),
                Ok(phase) => tracing::debug!(
                    location = %location,
                    attempt,
                    max_attempts,
                    phase = phase.as_deref().unwrap_or("<none>"),
                    "Job not ready"
                ),
                Err(reason) => tracing::warn!(
                    location = %location,
                    attempt,
                    max_attempts,
                    reason = %reason,
                    "Status check failed, will retry"
                ),
            }

            if attempt < max_attempts {
                sleep(self.settings.poll_interval).await;
            }
        }

        Err(ProcessingError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Phase of the first image entry in the status response.
    async fn query_phase(&self, location: &str) -> Result<Option<String>, String> {
        let url = self.endpoint("status", location).map_err(|e| e.to_string())?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.settings.api_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, snippet(&body)));
        }

        let body: StatusResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body
            .data
            .and_then(|data| data.images.into_iter().next())
            .and_then(|image| image.phase))
    }

    fn endpoint(&self, path: &str, location: &str) -> Result<Url, ProcessingError> {
        Url::parse_with_params(
            &format!("{}/{}", self.settings.api_base_url, path),
            &[("image_url", location)],
        )
        .map_err(|e| {
            ProcessingError::Endpoint(format!("{}/{}: {e}", self.settings.api_base_url, path))
        })
    }

    /// Write the decoded image as `{output_dir}/{name}{suffix}.{ext}`.
    ///
    /// An empty file on disk counts as a decode failure and is removed.
    pub async fn write_output(&self, task: &ImageTask, bytes: &[u8]) -> Result<PathBuf, ProcessingError> {
        let extension = output_extension(bytes, &task.location);
        let path = self.settings.output_dir.join(format!(
            "{}{}.{}",
            task.output_name, self.settings.output_suffix, extension
        ));

        let write_err = |source| ProcessingError::Write {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(write_err)?;
        tokio::fs::write(&path, bytes).await.map_err(write_err)?;

        let written = tokio::fs::metadata(&path).await.map_err(write_err)?.len();
        if written == 0 {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(DecodeError::Empty.into());
        }

        Ok(path)
    }
}

impl ProcessImage for ProcessingClient {
    async fn process(&self, location: &str) -> bool {
        ProcessingClient::process(self, location).await
    }
}

/// Extension for the output file: sniffed from the bytes, else the source's
/// own extension, else `jpg`.
pub fn output_extension(bytes: &[u8], location: &str) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(ext) = format.extensions_str().first() {
            return ext.to_string();
        }
    }
    source_extension(location).unwrap_or_else(|| "jpg".to_string())
}
