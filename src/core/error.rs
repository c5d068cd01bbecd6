use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inconsistent or missing settings. Fatal.
    Configuration,
    /// Dataset unreachable or a record failed to parse. Fatal.
    Load,
    Io,
    Parse,
    /// A backend could not be reached while opening the store.
    Backend,
}

#[derive(Debug, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn config(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Configuration, context)
    }

    pub fn load(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Load, context)
    }

    pub fn backend(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Backend, context)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Configuration | ErrorKind::Load)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
