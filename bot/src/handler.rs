use comms::msg::Msg;
use log::warn;
use solver::SolverErr;

use crate::state::StateHandle;

/// Applies one boss message to the shared state. Everything is a flag the
/// solve loop picks up at its next safe point; only an unusable job table
/// is fatal.
pub fn dispatch(msg: Msg, state: &StateHandle) -> Result<(), SolverErr> {
    match msg {
        Msg::JobData { job_data } => state.install_table(job_data),
        Msg::UpdateSolution { solution } => {
            state.offer_solution(solution);
            Ok(())
        }
        Msg::RandomStart => {
            state.direct_random_start();
            Ok(())
        }
        Msg::SendSolution => {
            state.request_solution();
            Ok(())
        }
        Msg::Stop => {
            state.set_running(false);
            Ok(())
        }
        Msg::Start => {
            state.set_running(true);
            Ok(())
        }
        Msg::Quit => {
            state.quit();
            Ok(())
        }
        other => {
            warn!("dropping an unexpected {} message from the boss", other.kind());
            Ok(())
        }
    }
}
