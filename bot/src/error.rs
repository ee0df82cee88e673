use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

use solver::SolverErr;

pub type Result<T> = std::result::Result<T, BotErr>;

/// Failures that end the bot process. Connection drops are not errors at
/// this level, the bot reconnects on its own.
#[derive(Debug)]
pub enum BotErr {
    Io(io::Error),
    Solver(SolverErr),
}

impl Display for BotErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Io(e) => format!("io failure: {e}"),
            Self::Solver(e) => format!("fatal {} failure: {e}", e.class()),
        };
        write!(f, "{msg}")
    }
}

impl Error for BotErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Solver(e) => Some(e),
        }
    }
}

impl From<io::Error> for BotErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SolverErr> for BotErr {
    fn from(value: SolverErr) -> Self {
        Self::Solver(value)
    }
}
