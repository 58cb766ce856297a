//! Upload validation and filename hygiene.

use crate::error::AppError;
use std::path::Path;

/// Extensions the gateway accepts. The extension is the only type signal we
/// trust; client-declared content types are passed through to storage but
/// never consulted for validation.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["pdf", "png", "jpg", "jpeg", "tiff", "bmp"];

/// Check a filename's extension (case-insensitive) against the whitelist.
pub fn validate_file_type(filename: &str) -> Result<(), AppError> {
    let lowered = filename.to_lowercase();
    let extension = Path::new(&lowered)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if ALLOWED_EXTENSIONS.contains(&extension) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "unsupported file extension '{}', allowed: {}",
            extension,
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

/// Keep only alphanumerics, dot, underscore, dash and space, then trim
/// surrounding whitespace. Uniqueness is not a goal here; the storage key
/// adds that separately.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

/// File size in kilobytes, unrounded.
pub fn file_size_kb(len: usize) -> f64 {
    len as f64 / 1024.0
}

// ============================================================================
// Tests
// ============================================================================
