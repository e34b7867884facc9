//! Image byte fixtures for the fake processing API

#![allow(dead_code)]

use base64::Engine;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
pub const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0";

/// A payload that sniffs as PNG, padded to `len` bytes.
pub fn png_bytes(len: usize, fill: u8) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.resize(len.max(PNG_MAGIC.len()), fill);
    bytes
}

/// A payload that sniffs as JPEG, padded to `len` bytes.
pub fn jpeg_bytes(len: usize, fill: u8) -> Vec<u8> {
    let mut bytes = JPEG_MAGIC.to_vec();
    bytes.resize(len.max(JPEG_MAGIC.len()), fill);
    bytes
}

pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Drive-style listing page referencing each id twice.
pub fn folder_listing(ids: &[&str]) -> String {
    let mut html = String::from("<html><body>");
    for id in ids {
        html.push_str(&format!(r#"<div class="entry" data-id="{id}">"#));
        html.push_str(&format!(r#"<a href="/file/d/{id}/view?usp=drive_link">open</a></div>"#));
    }
    html.push_str("</body></html>");
    html
}
