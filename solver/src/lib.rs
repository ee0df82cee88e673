mod error;
pub mod model;
mod params;
mod solver;
mod stepper;
mod table;

pub use error::{Result, SolverErr};
pub use params::{Params, StepDeltas};
pub use solver::{SolverOptions, TableSolver};
pub use stepper::{ParamId, ParamKind, param_list, step_param};
pub use table::FrequencyTable;
