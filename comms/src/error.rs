use std::{error::Error, fmt, io};

/// The comms crate result type.
pub type Result<T> = std::result::Result<T, CommsErr>;

/// A failure while moving one message across a connection.
#[derive(Debug)]
pub enum CommsErr {
    /// The underlying transport failed; the connection is unusable.
    Io(io::Error),
    /// One frame carried an undecodable payload; the stream itself is still
    /// framed correctly and the caller may keep receiving.
    Malformed(serde_json::Error),
}

impl fmt::Display for CommsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "transport failure: {e}"),
            Self::Malformed(e) => write!(f, "malformed message payload: {e}"),
        }
    }
}

impl Error for CommsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Malformed(e) => Some(e),
        }
    }
}

impl From<io::Error> for CommsErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
