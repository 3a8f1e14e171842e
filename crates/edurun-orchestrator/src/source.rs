//! Loading learner source files from disk.
//!
//! Used by the CLI to submit a file instead of an editor buffer.

use std::path::{Path, PathBuf};

use crate::error::{EduRunError, Result};
use crate::language::{LanguageDescriptor, LanguageRegistry};

/// Maximum accepted source file size in bytes (100KB).
pub const MAX_SOURCE_SIZE: u64 = 100 * 1024;

/// A learner program read from disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Canonical path to the file.
    pub path: PathBuf,
    /// File contents.
    pub code: String,
    /// Language detected from the extension, if any.
    pub language: Option<LanguageDescriptor>,
}

impl SourceFile {
    /// Loads a source file and detects its language.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::SourceNotFound` if the file doesn't exist.
    /// Returns `EduRunError::SourceTooLarge` if the file exceeds 100KB.
    /// Returns `EduRunError::SourceEncodingError` if the file is not valid UTF-8.
    pub fn load(path: impl AsRef<Path>, registry: &LanguageRegistry) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EduRunError::source_not_found(path)
            } else {
                EduRunError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_SOURCE_SIZE {
            return Err(EduRunError::source_too_large(path, file_size / 1024));
        }

        let code = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                EduRunError::source_encoding(path)
            } else {
                EduRunError::Io(e)
            }
        })?;

        let canonical_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let language = registry.from_path(path).cloned();

        Ok(Self {
            path: canonical_path,
            code,
            language,
        })
    }
}
