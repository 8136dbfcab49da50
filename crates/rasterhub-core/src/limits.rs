// this_file: crates/rasterhub-core/src/limits.rs

//! Input limits and font path sanitisation.
//!
//! Everything arriving over the wire passes through here before a font is
//! opened or a canvas is allocated.

use camino::{Utf8Path, Utf8PathBuf};
use std::time::Duration;

/// Maximum accepted job-spec document size (10MB)
pub const MAX_JSON_SIZE: usize = 10 * 1024 * 1024;
/// Maximum number of jobs in one job-spec document
pub const MAX_JOBS_PER_SPEC: usize = 10_000;
/// Maximum text length in bytes
pub const MAX_TEXT_LENGTH: usize = 10_000;
/// Maximum font file size (50MB)
pub const MAX_FONT_FILE_SIZE: u64 = 50 * 1024 * 1024;
/// Maximum canvas side in pixels
pub const MAX_CANVAS_DIMENSION: u32 = 10_000;
/// Maximum font size in pixels per em
pub const MAX_FONT_SIZE_PX: f32 = 10_000.0;
/// Default per-job time budget
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Path and size validation failures.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Path {path} is outside base directory {base}")]
    PathOutsideBase { path: String, base: String },

    #[error("Font file too large: {size} bytes (max: {max})")]
    FontTooLarge { size: u64, max: u64 },

    #[error("Text too long: {len} bytes (max: {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("Text contains control character U+{0:04X}")]
    ControlCharacter(u32),
}

/// Resolve a font path to its canonical absolute form.
///
/// Relative paths are resolved against `base_dir` (or the working directory).
/// With a base directory, the canonical path must stay inside it.
pub fn sanitize_path(
    path: &Utf8Path,
    base_dir: Option<&Utf8Path>,
) -> Result<Utf8PathBuf, SecurityError> {
    if path.as_str().is_empty() {
        return Err(SecurityError::InvalidPath("empty path".to_string()));
    }
    if path.as_str().contains('\0') {
        return Err(SecurityError::InvalidPath("path contains NUL byte".to_string()));
    }
    if path
        .components()
        .any(|c| matches!(c, camino::Utf8Component::ParentDir))
    {
        return Err(SecurityError::InvalidPath(format!(
            "{path} contains a parent-directory component"
        )));
    }

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else if let Some(base) = base_dir {
        base.join(path)
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| SecurityError::InvalidPath(format!("cannot read current dir: {e}")))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| SecurityError::InvalidPath("non-UTF-8 current directory".to_string()))?;
        cwd.join(path)
    };

    let canonical = canonicalize(&joined)?;

    if let Some(base) = base_dir {
        let base_canonical = canonicalize(base)?;
        if !canonical.starts_with(&base_canonical) {
            return Err(SecurityError::PathOutsideBase {
                path: canonical.to_string(),
                base: base_canonical.to_string(),
            });
        }
    }

    Ok(canonical)
}

fn canonicalize(path: &Utf8Path) -> Result<Utf8PathBuf, SecurityError> {
    path.canonicalize_utf8().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SecurityError::PathNotFound(path.to_string())
        } else {
            SecurityError::InvalidPath(format!("cannot resolve {path}: {e}"))
        }
    })
}

/// Validate font file size.
pub fn validate_font_file_size(size: u64) -> Result<(), SecurityError> {
    if size > MAX_FONT_FILE_SIZE {
        return Err(SecurityError::FontTooLarge {
            size,
            max: MAX_FONT_FILE_SIZE,
        });
    }
    Ok(())
}

/// Validate text length and reject control characters other than tab and newline.
pub fn validate_text_input(text: &str) -> Result<(), SecurityError> {
    if text.len() > MAX_TEXT_LENGTH {
        return Err(SecurityError::TextTooLong {
            len: text.len(),
            max: MAX_TEXT_LENGTH,
        });
    }
    if let Some(c) = text
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(SecurityError::ControlCharacter(c as u32));
    }
    Ok(())
}
