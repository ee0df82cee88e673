use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire solver crate.
pub type Result<T> = std::result::Result<T, SolverErr>;

/// The solver crate's error type.
///
/// Data failures are structural defects of the input table and are fatal at
/// load or standardize time. Numeric failures happen mid-evaluation and are
/// fatal to the step that produced them.
#[derive(Debug)]
pub enum SolverErr {
    /// A table line failed to parse.
    Parse { line: usize, detail: String },
    /// A cell is negative or non-finite.
    BadCell { row: usize, col: usize, value: f64 },
    /// An entire row or column sums to zero, so its multiplier has no
    /// zero-correlation starting value.
    ZeroMarginal { axis: &'static str, index: usize },
    /// A multiplier block contains a nonpositive or non-finite value, so its
    /// geometric mean is undefined.
    DegenerateMultipliers { axis: &'static str },
    /// A shape invariant was violated (e.g. mismatched lengths).
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A fitted frequency left the positive finite range during evaluation.
    NonPositiveFitted { row: usize, col: usize, value: f64 },
    /// The chi-square total went non-finite.
    NonFiniteError { value: f64 },
}

impl SolverErr {
    /// Coarse class used by operator-facing logs: `data` defects are wrong
    /// inputs, `numeric` defects are blown-up arithmetic.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Parse { .. }
            | Self::BadCell { .. }
            | Self::ZeroMarginal { .. }
            | Self::DegenerateMultipliers { .. }
            | Self::ShapeMismatch { .. } => "data",
            Self::NonPositiveFitted { .. } | Self::NonFiniteError { .. } => "numeric",
        }
    }
}

impl Display for SolverErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverErr::Parse { line, detail } => {
                format!("Failed to parse table line {line}: {detail}")
            }
            SolverErr::BadCell { row, col, value } => {
                format!("Cell ({row}, {col}) holds {value}, frequencies must be finite and >= 0")
            }
            SolverErr::ZeroMarginal { axis, index } => {
                format!("The {axis} at index {index} sums to zero")
            }
            SolverErr::DegenerateMultipliers { axis } => {
                format!("The {axis} multipliers have no positive geometric mean")
            }
            SolverErr::ShapeMismatch {
                what,
                got,
                expected,
            } => {
                format!("Shape mismatch for {what}: got {got}, expected {expected}")
            }
            SolverErr::NonPositiveFitted { row, col, value } => {
                format!("Fitted frequency ({row}, {col}) degenerated to {value}")
            }
            SolverErr::NonFiniteError { value } => {
                format!("The chi-square total degenerated to {value}")
            }
        };

        write!(f, "{s}")
    }
}

impl Error for SolverErr {}
