use serde::{Deserialize, Serialize};

/// The input frequency table, relayed verbatim to every joining bot. The
/// dimensions ride along explicitly; receivers check them against the
/// labels before using the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    pub nrow: usize,
    pub ncol: usize,
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    /// Row-major nonnegative frequencies, one inner vector per row.
    pub data: Vec<Vec<f64>>,
}

/// An immutable snapshot of one fitted parameter vector together with the
/// chi-square error it was measured at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub rx: Vec<f64>,
    pub cx: Vec<f64>,
    pub rm: Vec<f64>,
    pub cm: Vec<f64>,
    pub a: f64,
    pub error: f64,
    /// Milliseconds since the unix epoch, stamped by the producer.
    pub timestamp: u64,
}

impl Solution {
    /// Shape compatibility against a table of `nrow` by `ncol`.
    pub fn fits(&self, nrow: usize, ncol: usize) -> bool {
        self.rx.len() == nrow
            && self.rm.len() == nrow
            && self.cx.len() == ncol
            && self.cm.len() == ncol
    }
}

/// The application layer message for the entire system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Msg {
    /// A bot announces itself right after connecting or reconnecting.
    Join { name: String },
    /// A bot reports the error of its current local minimum.
    Error { error: f64 },
    /// A bot ships its full current solution, on request.
    Solution { solution: Solution },
    /// The boss relays the table to a joining bot.
    JobData { job_data: JobData },
    /// The boss disseminates the swarm-wide best solution.
    UpdateSolution { solution: Solution },
    /// The boss directs a bot without prior state to self-initialize.
    RandomStart,
    /// The boss asks a bot for its full current solution.
    SendSolution,
    /// Pause the solve loop at the next epoch boundary.
    Stop,
    /// Resume a paused solve loop.
    Start,
    /// Orderly termination.
    Quit,
}

impl Msg {
    /// The wire command name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Error { .. } => "error",
            Self::Solution { .. } => "solution",
            Self::JobData { .. } => "job_data",
            Self::UpdateSolution { .. } => "update_solution",
            Self::RandomStart => "random_start",
            Self::SendSolution => "send_solution",
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Quit => "quit",
        }
    }
}
