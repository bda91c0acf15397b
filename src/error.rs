// ============================================================
// Error taxonomy
// ============================================================
// Failures raised by the resolver, backend, builder and data
// layers. The application and CLI layers wrap these in anyhow
// with extra context; tests downcast back to `Error` to check
// which class of failure was produced.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every failure class a run can end with.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed document / config-file fields.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A dataset or type name that is not registered.
    #[error("unknown {kind} '{name}' (known: {known})")]
    Lookup {
        kind:  &'static str,
        name:  String,
        known: String,
    },

    /// Backend construction or device failure.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Checkpoint, manifest or dataset file access.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// A missing or malformed setting.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// A backend that cannot be built for the requested device or datatype.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    /// `name` is not one of the registered `known` names of `kind`.
    pub fn lookup(kind: &'static str, name: impl Into<String>, known: &[&str]) -> Self {
        Self::Lookup {
            kind,
            name:  name.into(),
            known: known.join(", "),
        }
    }

    /// An I/O failure on `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// A file that exists but whose content cannot be used.
    pub fn invalid_file(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, message.into()),
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
