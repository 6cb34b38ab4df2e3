//! Error types for document reading and writing

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while reading or writing feature documents and tables
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("Table error: {0}")]
    Table(#[from] csv::Error),

    /// Structurally valid document with unusable content
    #[error("Invalid {element}: {message}")]
    Invalid { element: String, message: String },

    /// Any of the above, with the file it happened in
    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<FormatError>,
    },
}

/// Result type for format operations
pub type FormatResult<T> = Result<T, FormatError>;

impl FormatError {
    pub fn invalid(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            element: element.into(),
            message: message.into(),
        }
    }

    /// Attach the file path
    pub fn in_file(self, path: &Path) -> Self {
        match self {
            FormatError::InFile { .. } => self,
            other => FormatError::InFile {
                path: path.to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    /// The file the error happened in, if known
    pub fn path(&self) -> Option<&Path> {
        match self {
            FormatError::InFile { path, .. } => Some(path),
            _ => None,
        }
    }
}
