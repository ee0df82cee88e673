use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use solver::SolverErr;

/// The boss crate result type.
pub type Result<T> = std::result::Result<T, BossErr>;

/// Failures that bring the boss process down.
#[derive(Debug)]
pub enum BossErr {
    /// Filesystem or listener failure.
    Io(io::Error),
    /// The input table is unusable.
    Table(SolverErr),
}

impl Display for BossErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io failure: {e}"),
            Self::Table(e) => write!(f, "unusable input table: {e}"),
        }
    }
}

impl Error for BossErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Table(e) => Some(e),
        }
    }
}

impl From<io::Error> for BossErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SolverErr> for BossErr {
    fn from(value: SolverErr) -> Self {
        Self::Table(value)
    }
}
