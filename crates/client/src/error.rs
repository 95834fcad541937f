use std::path::PathBuf;
use thiserror::Error;

use crate::xml::ParseError;

/// Legacy numeric codes, kept so that tools speaking the GUI-RPC protocol
/// see the same values as before.
pub const ERR_FOPEN: i32 = -108;
pub const ERR_RENAME: i32 = -110;
pub const ERR_XML_PARSE: i32 = -112;
pub const ERR_NOT_UNIQUE: i32 = -137;
pub const ERR_NOT_FOUND: i32 = -161;

#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("can't write {path:?} after {attempts} attempts: {source}")]
    FileOpen {
        path: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    #[error("XML parse error: {0}")]
    XmlParse(#[from] ParseError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not unique: {0}")]
    NotUnique(String),

    #[error("no project: {0}")]
    NoProject(String),

    #[error("rename {from:?} -> {to:?} failed after {attempts} attempts: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn code(&self) -> i32 {
        match self {
            ClientError::FileOpen { .. } | ClientError::Io { .. } => ERR_FOPEN,
            ClientError::XmlParse(_) => ERR_XML_PARSE,
            ClientError::NotFound(_) | ClientError::NoProject(_) => ERR_NOT_FOUND,
            ClientError::NotUnique(_) => ERR_NOT_UNIQUE,
            ClientError::Rename { .. } => ERR_RENAME,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ClientError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
