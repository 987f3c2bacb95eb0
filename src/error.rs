use std::{error::Error as StdError, fmt, io};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the training pipeline.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Download {
        url: String,
        detail: String,
    },
    Archive {
        detail: String,
    },
    DatasetFormat {
        file: String,
        detail: String,
    },
    WeightsFormat {
        file: String,
        detail: String,
    },
    LengthMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Distribution(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Download { url, detail } => {
                write!(f, "failed to download {url}: {detail}")
            }
            Error::Archive { detail } => write!(f, "failed to unpack archive: {detail}"),
            Error::DatasetFormat { file, detail } => {
                write!(f, "malformed dataset file {file}: {detail}")
            }
            Error::WeightsFormat { file, detail } => {
                write!(f, "malformed weights file {file}: {detail}")
            }
            Error::LengthMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} length mismatch: got {got}, expected {expected}"),
            Error::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} shape mismatch: got {got:?}, expected {expected:?}"),
            Error::Distribution(detail) => write!(f, "invalid distribution: {detail}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<NormalError> for Error {
    fn from(value: NormalError) -> Self {
        Self::Distribution(value.to_string())
    }
}

impl From<UniformError> for Error {
    fn from(value: UniformError) -> Self {
        Self::Distribution(value.to_string())
    }
}
