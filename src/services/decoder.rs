//! Result decoding
//!
//! The result endpoint answers in several shapes: a raw image, JSON holding a
//! base64 image under one of several field paths, or an image content type
//! whose body is actually base64 text. Decoding is an ordered list of
//! strategies; each either yields bytes, hands over to the next one with a
//! reason, or fails outright.

use base64::Engine;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;

use crate::services::snippet;

/// JSON pointers searched, in order, for the base64 image string.
///
/// Collected from observed API responses; not a documented schema.
pub const BASE64_FIELD_PATHS: &[&str] = &[
    "/data/image",
    "/data/result",
    "/data/images/0/image",
    "/data/images/0/result",
    "/data/images/0/url_data",
    "/image",
    "/result",
    "/base64",
    "/data",
];

/// Outcome of one decoding strategy.
#[derive(Debug)]
pub enum Attempt {
    Decoded(Vec<u8>),
    Next(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Binary,
    Json,
}

const STRATEGIES: [Strategy; 2] = [Strategy::Binary, Strategy::Json];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Result request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Result endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No base64 image field found in JSON result")]
    NoImageField,

    #[error("Unexpected result content type {0:?}")]
    UnexpectedContentType(String),

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decoded image is empty")]
    Empty,

    #[error("No decoding strategy produced an image")]
    Exhausted,
}

/// Fetches a result URL and normalizes whatever comes back into image bytes.
pub struct ResultDecoder {
    http: Client,
    api_token: String,
    min_image_bytes: usize,
}

impl ResultDecoder {
    pub fn new(http: Client, api_token: String, min_image_bytes: usize) -> Self {
        Self {
            http,
            api_token,
            min_image_bytes,
        }
    }

    /// Run the strategies in order and return the first decoded image.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, DecodeError> {
        for strategy in STRATEGIES {
            let attempt = match strategy {
                Strategy::Binary => self.fetch_binary(url).await,
                Strategy::Json => self.fetch_json(url).await?,
            };

            match attempt {
                Attempt::Decoded(bytes) if bytes.is_empty() => return Err(DecodeError::Empty),
                Attempt::Decoded(bytes) => {
                    tracing::debug!(?strategy, bytes = bytes.len(), "Result decoded");
                    return Ok(bytes);
                }
                Attempt::Next(reason) => {
                    tracing::debug!(?strategy, %reason, "Decoding strategy fell through");
                }
            }
        }

        Err(DecodeError::Exhausted)
    }

    /// Raw image download. Any problem, including a suspiciously small
    /// payload, falls through to the JSON strategy.
    async fn fetch_binary(&self, url: &str) -> Attempt {
        let response = match self.get(url, "image/*").await {
            Ok(response) => response,
            Err(e) => return Attempt::Next(format!("request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return Attempt::Next(format!("HTTP {status}"));
        }

        let content_type = content_type(&response);
        if !content_type.starts_with("image/") {
            return Attempt::Next(format!("content type {content_type:?} is not an image"));
        }

        match response.bytes().await {
            Ok(bytes) if bytes.len() > self.min_image_bytes => Attempt::Decoded(bytes.to_vec()),
            Ok(bytes) => Attempt::Next(format!(
                "payload of {} bytes is below the {} byte minimum",
                bytes.len(),
                self.min_image_bytes
            )),
            Err(e) => Attempt::Next(format!("body read failed: {e}")),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Attempt, DecodeError> {
        let response = self.get(url, "application/json").await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DecodeError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let content_type = content_type(&response);
        if content_type.contains("json") {
            let body: Value = response.json().await?;
            let encoded = find_base64_field(&body).ok_or(DecodeError::NoImageField)?;
            return decode_base64_payload(encoded).map(Attempt::Decoded);
        }

        if content_type.starts_with("image/") {
            let body = response.bytes().await?;
            return self.decode_image_typed(url, &body).await;
        }

        Err(DecodeError::UnexpectedContentType(content_type))
    }

    /// An image content type returned despite asking for JSON. The body may
    /// be real image bytes or base64 text; failing both, download it again
    /// as raw binary.
    async fn decode_image_typed(&self, url: &str, body: &[u8]) -> Result<Attempt, DecodeError> {
        if image::guess_format(body).is_ok() {
            return Ok(Attempt::Decoded(body.to_vec()));
        }

        if let Ok(text) = std::str::from_utf8(body) {
            if looks_like_base64(text) {
                return decode_base64_payload(text).map(Attempt::Decoded);
            }
        }

        tracing::warn!(url = %url, "Image-typed result is neither binary nor base64, re-fetching raw");
        let response = self.get(url, "image/*").await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DecodeError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        Ok(Attempt::Decoded(response.bytes().await?.to_vec()))
    }

    async fn get(&self, url: &str, accept: &str) -> Result<Response, reqwest::Error> {
        self.http
            .get(url)
            .bearer_auth(&self.api_token)
            .header(ACCEPT, accept)
            .send()
            .await
    }
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// First non-empty string found at one of [`BASE64_FIELD_PATHS`].
pub fn find_base64_field(body: &Value) -> Option<&str> {
    BASE64_FIELD_PATHS
        .iter()
        .filter_map(|path| body.pointer(path).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Strip a `data:<mime>;base64,` or bare `base64,` prefix.
pub fn strip_base64_prefix(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix("data:") {
        if let Some(idx) = rest.find("base64,") {
            return &rest[idx + "base64,".len()..];
        }
    }
    trimmed.strip_prefix("base64,").unwrap_or(trimmed)
}

/// Normalize possibly corrupted base64 text.
///
/// Removes the prefix and all whitespace, drops characters outside the
/// standard alphabet (padding included) and re-pads to a multiple of four.
/// Returns the cleaned string and the number of invalid characters dropped.
pub fn repair_base64(raw: &str) -> (String, usize) {
    let body = strip_base64_prefix(raw);
    let mut cleaned = String::with_capacity(body.len() + 3);
    let mut dropped = 0;

    for c in body.chars() {
        if c.is_whitespace() || c == '=' {
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '+' || c == '/' {
            cleaned.push(c);
        } else {
            dropped += 1;
        }
    }

    let padding = (4 - cleaned.len() % 4) % 4;
    cleaned.extend(std::iter::repeat('=').take(padding));
    (cleaned, dropped)
}

/// Repair and decode a base64 image string.
pub fn decode_base64_payload(raw: &str) -> Result<Vec<u8>, DecodeError> {
    let (cleaned, dropped) = repair_base64(raw);
    if dropped > 0 {
        tracing::warn!(dropped, "Removed invalid characters from base64 image data");
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned.as_bytes())?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(bytes)
}

/// Strict check: only alphabet characters, correct length, padding at the end.
pub fn looks_like_base64(text: &str) -> bool {
    let compact: String = strip_base64_prefix(text.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if compact.is_empty() || compact.len() % 4 != 0 {
        return false;
    }

    let unpadded = compact.trim_end_matches('=');
    compact.len() - unpadded.len() <= 2
        && unpadded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/')
}
