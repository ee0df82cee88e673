use std::io;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use comms::msg::{Msg, Solution};
use comms::{CommsErr, MsgReceiver, MsgSender};
use log::{debug, error, info, warn};
use ndarray::Array1;
use solver::{Params, TableSolver};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::{task, time};

use crate::config::BotConfig;
use crate::handler;
use crate::state::{SafePoint, StateHandle};
use crate::{BotErr, Result};

/// Reports and replies waiting for the socket. The solve loop never blocks
/// on this queue; when it is full the message is dropped and retried later.
const OUTBOUND_DEPTH: usize = 64;
/// Epochs between progress log lines.
const STATUS_EVERY_EPOCHS: usize = 1000;

/// Runs one bot to completion: a solve loop and a connection loop tied
/// together by the shared state. Either side ending takes the other down
/// with it.
pub async fn run(config: BotConfig) -> Result<()> {
    let state = StateHandle::new();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_DEPTH);

    let solve = task::spawn(solve_loop(state.clone(), out_tx, config.clone()));
    let net = task::spawn(connection_loop(state, out_rx, config));

    let (solve_res, net_res) = tokio::join!(solve, net);
    net_res.map_err(join_err)??;
    solve_res.map_err(join_err)?
}

async fn solve_loop(
    state: StateHandle,
    out: mpsc::Sender<Msg>,
    config: BotConfig,
) -> Result<()> {
    let result = solve_inner(&state, &out, &config).await;
    state.quit();
    result
}

/// The solver driver. Between epochs it consults the shared state for
/// directives; everything the handler queued is observed here, at a safe
/// point, never mid-epoch.
async fn solve_inner(
    state: &StateHandle,
    out: &mpsc::Sender<Msg>,
    config: &BotConfig,
) -> Result<()> {
    let mut solver: Option<TableSolver> = None;
    let mut reporter = Reporter::new(config.report_interval);

    loop {
        let action = state.next_action(solver.as_ref().map(TableSolver::minimum_error));

        if action.reply_with_solution {
            match &solver {
                Some(live) => queue_solution(out, live),
                None => debug!("no state yet, ignoring the solution request"),
            }
        }

        match action.step {
            SafePoint::Quit => {
                info!("solve loop stopping");
                return Ok(());
            }
            SafePoint::Restart => {
                let fresh = run_multi_start(state, config).await?;
                let minimum = fresh.minimum_error();
                info!(error = minimum; "random start complete");
                reporter.force(out, minimum);
                solver = Some(fresh);
            }
            SafePoint::Adopt(solution) => {
                adopt_solution(&mut solver, state, config, solution);
                if let Some(live) = &solver {
                    reporter.maybe(out, live.minimum_error());
                }
            }
            SafePoint::Park => state.wait().await,
            SafePoint::Run => {
                let Some(live) = solver.as_mut() else {
                    state.wait().await;
                    continue;
                };
                let minimum = live.epoch()?;
                state.set_current_error(minimum);
                reporter.maybe(out, minimum);
                if live.epochs_run() % STATUS_EVERY_EPOCHS == 0 {
                    let drained = live.take_history();
                    if let Some(&(epoch, error)) = drained.last() {
                        info!(epoch = epoch, error = error; "still solving");
                    }
                }
                task::yield_now().await;
            }
        }
    }
}

/// Multi-start initialization on the blocking pool. The state is marked for
/// its whole duration so incoming offers defer instead of interrupting.
async fn run_multi_start(state: &StateHandle, config: &BotConfig) -> Result<TableSolver> {
    let Some(table) = state.table() else {
        return Err(BotErr::Io(io::Error::new(
            io::ErrorKind::Other,
            "restart without a job table",
        )));
    };
    info!(
        tries = config.tries;
        "random start over {} rows x {} columns",
        table.nrow(),
        table.ncol()
    );

    state.enter_random_start();
    let options = config.solver_options();
    let joined = task::spawn_blocking(move || TableSolver::multi_start(table, options)).await;
    state.leave_random_start();

    let solver = joined.map_err(join_err)??;
    state.set_current_error(solver.minimum_error());
    Ok(solver)
}

/// Installs an external solution, either into the live solver or as the
/// first state of a fresh one. A vector the solver rejects is discarded
/// with a warning; the swarm keeps running on what it had.
fn adopt_solution(
    solver: &mut Option<TableSolver>,
    state: &StateHandle,
    config: &BotConfig,
    solution: Solution,
) {
    let claimed = solution.error;
    let params = params_from(&solution);

    let outcome = match solver.as_mut() {
        Some(live) => live.adopt(params),
        None => {
            let Some(table) = state.table() else {
                return;
            };
            TableSolver::from_params(table, config.solver_options(), params).map(|fresh| {
                let minimum = fresh.minimum_error();
                *solver = Some(fresh);
                minimum
            })
        }
    };

    match outcome {
        Ok(minimum) => {
            state.set_current_error(minimum);
            info!(error = minimum, claimed = claimed; "adopted the swarm best");
        }
        Err(e) => warn!("could not adopt an update claiming {claimed}: {e}"),
    }
}

fn queue_solution(out: &mpsc::Sender<Msg>, solver: &TableSolver) {
    let msg = Msg::Solution {
        solution: solution_from(solver),
    };
    if out.try_send(msg).is_err() {
        debug!("solution reply dropped, the outbound queue is unavailable");
    }
}

/// Dials the boss and runs sessions until shutdown, backing off between
/// attempts. The outbound queue outlives every session, so the solve loop
/// never learns about reconnects.
async fn connection_loop(
    state: StateHandle,
    out_rx: mpsc::Receiver<Msg>,
    config: BotConfig,
) -> Result<()> {
    let result = connect_inner(&state, out_rx, &config).await;
    state.quit();
    result
}

async fn connect_inner(
    state: &StateHandle,
    mut out_rx: mpsc::Receiver<Msg>,
    config: &BotConfig,
) -> Result<()> {
    let mut backoff = config.reconnect_backoff;

    loop {
        let attempt = tokio::select! {
            _ = state.cancelled() => return Ok(()),
            attempt = TcpStream::connect(&config.boss_addr) => attempt,
        };

        match attempt {
            Ok(stream) => {
                info!("connected to the boss at {}", config.boss_addr);
                backoff = config.reconnect_backoff;
                let (read, write) = stream.into_split();
                let (rx, mut tx) = comms::channel(read, write);

                match tx.send(&Msg::Join { name: config.name.clone() }).await {
                    Ok(()) => out_rx = session(rx, tx, out_rx, state).await?,
                    Err(e) => warn!("could not join: {e}"),
                }
            }
            Err(e) => warn!("could not reach the boss at {}: {e}", config.boss_addr),
        }

        if state.is_cancelled() {
            return Ok(());
        }
        info!("reconnecting in {backoff:?}");
        tokio::select! {
            _ = state.cancelled() => return Ok(()),
            _ = time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }
}

/// Runs one connected session and hands the outbound queue back when the
/// connection ends, so the next session drains the same queue. Malformed
/// frames are dropped without ending the session; only an unusable job
/// table is fatal.
async fn session<R, W>(
    mut rx: MsgReceiver<R>,
    tx: MsgSender<W>,
    out_rx: mpsc::Receiver<Msg>,
    state: &StateHandle,
) -> Result<mpsc::Receiver<Msg>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel();
    let mut writer = task::spawn(write_loop(tx, out_rx, stop_rx));

    let mut fatal = None;
    loop {
        tokio::select! {
            joined = &mut writer => {
                let (out_rx, result) = joined.map_err(join_err)?;
                if let Err(e) = result {
                    info!("connection lost while writing: {e}");
                }
                return Ok(out_rx);
            }
            incoming = rx.recv() => match incoming {
                Ok(msg) => {
                    if let Err(e) = handler::dispatch(msg, state) {
                        error!("unusable job from the boss: {e}");
                        fatal = Some(BotErr::Solver(e));
                        break;
                    }
                    if state.is_cancelled() {
                        break;
                    }
                }
                Err(CommsErr::Malformed(e)) => warn!("dropping a malformed message: {e}"),
                Err(CommsErr::Io(e)) => {
                    info!("connection lost: {e}");
                    break;
                }
            },
            _ = state.cancelled() => break,
        }
    }

    // Reclaim the outbound queue from the writer before leaving.
    let _ = stop_tx.send(());
    let (out_rx, _) = writer.await.map_err(join_err)?;
    match fatal {
        Some(e) => Err(e),
        None => Ok(out_rx),
    }
}

/// Drains the outbound queue into the socket until told to stop, the queue
/// closes, or the transport fails. Returns the queue either way.
async fn write_loop<W>(
    mut tx: MsgSender<W>,
    mut out_rx: mpsc::Receiver<Msg>,
    mut stop: oneshot::Receiver<()>,
) -> (mpsc::Receiver<Msg>, comms::Result<()>)
where
    W: AsyncWrite + Unpin,
{
    let result = loop {
        tokio::select! {
            _ = &mut stop => break Ok(()),
            queued = out_rx.recv() => match queued {
                Some(msg) => {
                    if let Err(e) = tx.send(&msg).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };
    (out_rx, result)
}

fn join_err(e: task::JoinError) -> BotErr {
    BotErr::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("compute join error: {e}"),
    ))
}

fn solution_from(solver: &TableSolver) -> Solution {
    let params = solver.params();
    Solution {
        rx: params.rx.to_vec(),
        cx: params.cx.to_vec(),
        rm: params.rm.to_vec(),
        cm: params.cm.to_vec(),
        a: params.a,
        error: solver.minimum_error(),
        timestamp: unix_millis(),
    }
}

fn params_from(solution: &Solution) -> Params {
    Params {
        rx: Array1::from_vec(solution.rx.clone()),
        cx: Array1::from_vec(solution.cx.clone()),
        rm: Array1::from_vec(solution.rm.clone()),
        cm: Array1::from_vec(solution.cm.clone()),
        a: solution.a,
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Rate-limited improvement reports. A dropped send is not recorded, so it
/// is retried at the next improvement check.
struct Reporter {
    interval: Duration,
    last_error: Option<f64>,
    last_time: Option<Instant>,
}

impl Reporter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_error: None,
            last_time: None,
        }
    }

    /// Reports unconditionally, as after a restart.
    fn force(&mut self, out: &mpsc::Sender<Msg>, error: f64) {
        self.send(out, error);
    }

    /// Reports a strict improvement over the last reported error, at most
    /// once per interval.
    fn maybe(&mut self, out: &mpsc::Sender<Msg>, error: f64) {
        let improved = self.last_error.is_none_or(|last| error < last);
        let due = self.last_time.is_none_or(|at| at.elapsed() >= self.interval);
        if improved && due {
            self.send(out, error);
        }
    }

    fn send(&mut self, out: &mpsc::Sender<Msg>, error: f64) {
        match out.try_send(Msg::Error { error }) {
            Ok(()) => {
                self.last_error = Some(error);
                self.last_time = Some(Instant::now());
            }
            Err(_) => debug!("report at {error} dropped, the outbound queue is unavailable"),
        }
    }
}
