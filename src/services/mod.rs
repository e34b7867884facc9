pub mod decoder;
pub mod processing;
pub mod scheduler;
pub mod source;

const SNIPPET_LEN: usize = 300;

/// Truncate a response body for logging and error messages.
pub(crate) fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
