use std::sync::Arc;

use comms::msg::{JobData, Solution};
use log::{debug, warn};
use parking_lot::Mutex;
use solver::{FrequencyTable, SolverErr};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Flags shared between the connection handler and the solve loop. The
/// handler only ever sets them; the solve loop consumes them at the top of
/// an epoch, its safe point.
#[derive(Debug, Default)]
struct BotState {
    /// The solve loop steps only while set.
    running: bool,
    /// Installed once from the first `job_data` and kept for the life of
    /// the process.
    table: Option<Arc<FrequencyTable>>,
    /// Best external solution waiting to be adopted at a safe point.
    pending_solution: Option<Solution>,
    /// A `random_start` directive not yet consumed.
    random_start_pending: bool,
    /// The boss asked for the full parameter vector.
    solution_requested: bool,
    /// Error the solve loop last measured, mirrored here so the handler can
    /// screen incoming offers without touching the solver.
    current_error: Option<f64>,
    /// Set while the multi-start initialization runs off-thread.
    in_random_start: bool,
}

/// What the solve loop should do next, decided under one lock at a safe
/// point.
#[derive(Debug)]
pub enum SafePoint {
    /// Step through another epoch.
    Run,
    /// Take over this external solution, then keep stepping.
    Adopt(Solution),
    /// Throw the current state away and multi-start from scratch.
    Restart,
    /// Nothing to do until the handler wakes us.
    Park,
    /// Orderly exit.
    Quit,
}

#[derive(Debug)]
pub struct Action {
    pub step: SafePoint,
    /// Answer a pending `send_solution` before stepping.
    pub reply_with_solution: bool,
}

/// Cloneable handle over the shared bot state. Locks are short and never
/// held across an await.
#[derive(Debug, Clone)]
pub struct StateHandle {
    flags: Arc<Mutex<BotState>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl StateHandle {
    pub fn new() -> Self {
        Self {
            flags: Arc::new(Mutex::new(BotState::default())),
            wake: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Validates and installs the job table. Repeated deliveries after a
    /// reconnect keep the first table. A table that fails validation is
    /// unusable and the caller treats the error as fatal.
    pub fn install_table(&self, job: JobData) -> solver::Result<()> {
        if self.flags.lock().table.is_some() {
            debug!("table already installed, keeping the current one");
            return Ok(());
        }
        if job.row_labels.len() != job.nrow {
            return Err(SolverErr::ShapeMismatch {
                what: "row labels",
                got: job.row_labels.len(),
                expected: job.nrow,
            });
        }
        if job.column_labels.len() != job.ncol {
            return Err(SolverErr::ShapeMismatch {
                what: "column labels",
                got: job.column_labels.len(),
                expected: job.ncol,
            });
        }
        let table = Arc::new(FrequencyTable::new(
            job.row_labels,
            job.column_labels,
            job.data,
        )?);
        self.flags.lock().table = Some(table);
        self.wake.notify_one();
        Ok(())
    }

    /// Records an external solution for adoption at the next safe point.
    /// Offers that do not beat the loop's current minimum, or that do not
    /// fit the installed table, are dropped here. An offer also resumes a
    /// stopped bot.
    pub fn offer_solution(&self, solution: Solution) {
        let mut flags = self.flags.lock();

        if let Some(table) = &flags.table {
            if !solution.fits(table.nrow(), table.ncol()) {
                warn!("dropping an update whose dimensions do not match the job");
                return;
            }
        }

        if flags.current_error.is_some_and(|e| solution.error >= e) {
            debug!(
                "ignoring an update at {}, the local minimum is better",
                solution.error
            );
            return;
        }

        if flags.in_random_start {
            debug!(
                "deferring an update at {} until the restart finishes",
                solution.error
            );
        }

        let replace = flags
            .pending_solution
            .as_ref()
            .is_none_or(|p| solution.error < p.error);
        if replace {
            flags.pending_solution = Some(solution);
        }
        flags.running = true;
        drop(flags);
        self.wake.notify_one();
    }

    /// Queues a `random_start` directive.
    pub fn direct_random_start(&self) {
        let mut flags = self.flags.lock();
        flags.random_start_pending = true;
        flags.running = true;
        drop(flags);
        self.wake.notify_one();
    }

    /// Queues a `send_solution` request.
    pub fn request_solution(&self) {
        self.flags.lock().solution_requested = true;
        self.wake.notify_one();
    }

    pub fn set_running(&self, running: bool) {
        self.flags.lock().running = running;
        self.wake.notify_one();
    }

    /// Requests an orderly shutdown of both loops.
    pub fn quit(&self) {
        self.cancel.cancel();
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Parks until the handler signals new work. A signal raised since the
    /// last wait is not lost, `Notify` holds one permit.
    pub async fn wait(&self) {
        self.wake.notified().await;
    }

    pub fn table(&self) -> Option<Arc<FrequencyTable>> {
        self.flags.lock().table.clone()
    }

    pub fn set_current_error(&self, error: f64) {
        self.flags.lock().current_error = Some(error);
    }

    pub fn enter_random_start(&self) {
        self.flags.lock().in_random_start = true;
    }

    pub fn leave_random_start(&self) {
        self.flags.lock().in_random_start = false;
    }

    /// Decides the next step of the solve loop. `live_error` is the
    /// solver's current minimum, `None` before the first initialization.
    ///
    /// A pending restart directive is ignored once the bot has evolved
    /// state. A pending solution is adopted only if it still beats the
    /// live minimum at this moment. Both wait for the table to land.
    pub fn next_action(&self, live_error: Option<f64>) -> Action {
        if self.cancel.is_cancelled() {
            return Action {
                step: SafePoint::Quit,
                reply_with_solution: false,
            };
        }

        let mut flags = self.flags.lock();
        let reply_with_solution = std::mem::take(&mut flags.solution_requested);

        if flags.random_start_pending && flags.table.is_some() {
            flags.random_start_pending = false;
            if live_error.is_none() {
                return Action {
                    step: SafePoint::Restart,
                    reply_with_solution,
                };
            }
            warn!("ignoring a random start directive, keeping the evolved state");
        }

        if flags.table.is_some() {
            if let Some(pending) = flags.pending_solution.take() {
                if live_error.is_none_or(|e| pending.error < e) {
                    return Action {
                        step: SafePoint::Adopt(pending),
                        reply_with_solution,
                    };
                }
                debug!(
                    "discarding a stale update at {}, the local minimum won",
                    pending.error
                );
            }
        }

        let step = if flags.running && live_error.is_some() {
            SafePoint::Run
        } else {
            SafePoint::Park
        };
        Action {
            step,
            reply_with_solution,
        }
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_2x2() -> JobData {
        JobData {
            nrow: 2,
            ncol: 2,
            row_labels: vec!["a".into(), "b".into()],
            column_labels: vec!["x".into(), "y".into()],
            data: vec![vec![4.0, 2.0], vec![1.0, 3.0]],
        }
    }

    fn solution_2x2(error: f64) -> Solution {
        Solution {
            rx: vec![0.1, -0.1],
            cx: vec![0.2, -0.2],
            rm: vec![1.5, 2.0],
            cm: vec![1.0, 1.2],
            a: 1.4,
            error,
            timestamp: 7,
        }
    }

    #[test]
    fn fresh_state_parks() {
        let state = StateHandle::new();
        let action = state.next_action(None);
        assert!(matches!(action.step, SafePoint::Park));
        assert!(!action.reply_with_solution);
    }

    #[test]
    fn restart_waits_for_the_table() {
        let state = StateHandle::new();
        state.direct_random_start();
        assert!(matches!(state.next_action(None).step, SafePoint::Park));

        state.install_table(job_2x2()).unwrap();
        assert!(matches!(state.next_action(None).step, SafePoint::Restart));
        // Consumed by the previous call.
        assert!(matches!(state.next_action(None).step, SafePoint::Park));
    }

    #[test]
    fn restart_directive_is_ignored_once_evolved() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        state.direct_random_start();
        assert!(matches!(state.next_action(Some(3.0)).step, SafePoint::Run));
    }

    #[test]
    fn offers_are_screened_against_the_current_error() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        state.set_running(true);
        state.set_current_error(2.0);

        state.offer_solution(solution_2x2(2.5));
        assert!(matches!(state.next_action(Some(2.0)).step, SafePoint::Run));

        state.offer_solution(solution_2x2(1.5));
        match state.next_action(Some(2.0)).step {
            SafePoint::Adopt(solution) => assert_eq!(solution.error, 1.5),
            other => panic!("expected adoption, got {other:?}"),
        }
    }

    #[test]
    fn better_pending_offer_wins() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        state.offer_solution(solution_2x2(5.0));
        state.offer_solution(solution_2x2(3.0));
        state.offer_solution(solution_2x2(4.0));

        match state.next_action(None).step {
            SafePoint::Adopt(solution) => assert_eq!(solution.error, 3.0),
            other => panic!("expected adoption, got {other:?}"),
        }
    }

    #[test]
    fn adoption_rechecks_the_live_minimum() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        state.set_current_error(10.0);
        state.offer_solution(solution_2x2(5.0));

        // The loop kept improving past the offer before the safe point.
        let action = state.next_action(Some(4.0));
        assert!(matches!(action.step, SafePoint::Run));
    }

    #[test]
    fn mismatched_offer_is_dropped() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        let mut bad = solution_2x2(0.5);
        bad.rx.push(0.0);
        state.offer_solution(bad);
        assert!(matches!(state.next_action(None).step, SafePoint::Park));
    }

    #[test]
    fn an_offer_resumes_a_stopped_bot() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        state.set_running(false);
        state.offer_solution(solution_2x2(1.0));

        match state.next_action(Some(9.0)).step {
            SafePoint::Adopt(_) => {}
            other => panic!("expected adoption, got {other:?}"),
        }
        assert!(matches!(state.next_action(Some(1.0)).step, SafePoint::Run));
    }

    #[test]
    fn solution_request_is_answered_exactly_once() {
        let state = StateHandle::new();
        state.request_solution();
        assert!(state.next_action(None).reply_with_solution);
        assert!(!state.next_action(None).reply_with_solution);
    }

    #[test]
    fn quit_beats_everything() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        state.direct_random_start();
        state.request_solution();
        state.quit();

        let action = state.next_action(None);
        assert!(matches!(action.step, SafePoint::Quit));
        assert!(!action.reply_with_solution);
    }

    #[test]
    fn repeated_table_delivery_keeps_the_first() {
        let state = StateHandle::new();
        state.install_table(job_2x2()).unwrap();
        let mut second = job_2x2();
        second.data[0][0] = 100.0;
        state.install_table(second).unwrap();

        let table = state.table().unwrap();
        assert_eq!(table.data()[[0, 0]], 4.0);
    }
}
