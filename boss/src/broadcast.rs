use std::time::Duration;

use comms::msg::Msg;
use log::{debug, error, info};
use tokio::time;

use crate::{persist::SolutionLog, state::SwarmHandle};

/// Periodically pushes the swarm best to every connected bot, once per
/// improvement, and appends each broadcast solution to the log.
///
/// Delivery is best effort: a bot with a saturated queue misses this round
/// and catches up on a later one or at its next join.
pub async fn run(swarm: SwarmHandle, log: SolutionLog, period: Duration) {
    let mut ticker = time::interval(period);
    loop {
        ticker.tick().await;

        let Some(solution) = swarm.take_broadcast() else {
            continue;
        };
        info!(error = solution.error; "broadcasting a new swarm best");

        if let Err(e) = log.append(&solution) {
            error!("failed to persist the swarm best: {e}");
        }

        for sender in swarm.senders() {
            if sender
                .try_send(Msg::UpdateSolution {
                    solution: solution.clone(),
                })
                .is_err()
            {
                debug!("skipped a bot with a saturated outbound queue");
            }
        }
    }
}
