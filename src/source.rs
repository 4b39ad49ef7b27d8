//! Document sources. The caller owns the stream; the pipeline only sees bytes.

use std::path::{Path, PathBuf};

use crate::error::SourceError;

/// Something a document can be read from.
pub trait DocumentSource {
    /// Human-readable origin, for logs and problem messages.
    fn origin(&self) -> String;

    /// Read the whole document.
    fn open_stream(&self) -> Result<Vec<u8>, SourceError>;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn open_stream(&self) -> Result<Vec<u8>, SourceError> {
        std::fs::read(&self.path).map_err(|e| SourceError::Read {
            origin: self.origin(),
            source: e,
        })
    }
}

/// In-memory document.
#[derive(Debug, Clone)]
pub struct BytesSource {
    label: String,
    bytes: Vec<u8>,
}

impl BytesSource {
    pub fn new(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
        }
    }
}

impl DocumentSource for BytesSource {
    fn origin(&self) -> String {
        self.label.clone()
    }

    fn open_stream(&self) -> Result<Vec<u8>, SourceError> {
        Ok(self.bytes.clone())
    }
}
