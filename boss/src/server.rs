//! Connection handling: one reader task per bot plus a writer task draining
//! that bot's outbound queue, so a slow socket never stalls the swarm.

use std::io;

use comms::{
    CommsErr, MsgReceiver, MsgSender,
    msg::{JobData, Msg},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::mpsc,
};

use crate::state::{BotId, SwarmHandle};

/// Per-bot outbound queue depth. Broadcasts drop rather than wait when a
/// bot falls this far behind.
pub const OUTBOUND_DEPTH: usize = 32;

/// The table payload every joining bot is handed.
pub fn job_data(table: &solver::FrequencyTable) -> JobData {
    JobData {
        nrow: table.nrow(),
        ncol: table.ncol(),
        row_labels: table.row_labels().to_vec(),
        column_labels: table.column_labels().to_vec(),
        data: table.data().outer_iter().map(|row| row.to_vec()).collect(),
    }
}

/// Accepts bots forever, spawning a handler per connection.
pub async fn serve(listener: TcpListener, swarm: SwarmHandle, job: JobData) -> io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        info!("bot connected from {addr}");
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        tokio::spawn(handle_bot(rx, tx, swarm.clone(), job.clone()));
    }
}

/// Runs one bot's connection to completion: registers it, serves its
/// messages, and unregisters it when the transport drops.
pub async fn handle_bot<R, W>(mut rx: MsgReceiver<R>, tx: MsgSender<W>, swarm: SwarmHandle, job: JobData)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_DEPTH);
    let id = swarm.register(out_tx.clone());
    let writer = tokio::spawn(write_loop(tx, out_rx));

    match read_loop(&mut rx, &out_tx, &swarm, &job, id).await {
        Ok(()) => info!(bot = id; "bot left"),
        Err(e) => info!(bot = id; "bot disconnected: {e}"),
    }

    swarm.unregister(id);
    drop(out_tx);
    let _ = writer.await;
}

async fn write_loop<W>(mut tx: MsgSender<W>, mut out_rx: mpsc::Receiver<Msg>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = out_rx.recv().await {
        if let Err(e) = tx.send(&msg).await {
            debug!("outbound write failed: {e}");
            break;
        }
    }
}

async fn read_loop<R>(
    rx: &mut MsgReceiver<R>,
    out: &mpsc::Sender<Msg>,
    swarm: &SwarmHandle,
    job: &JobData,
    id: BotId,
) -> Result<(), CommsErr>
where
    R: AsyncRead + Unpin,
{
    loop {
        let msg = match rx.recv().await {
            Ok(msg) => msg,
            Err(CommsErr::Malformed(e)) => {
                warn!(bot = id; "dropping a malformed message: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };

        match msg {
            Msg::Join { name } => {
                info!(bot = id; "joined as {name}");
                swarm.set_name(id, &name);
                queue(out, Msg::JobData { job_data: job.clone() }).await?;
                let reply = match swarm.best_solution() {
                    Some(solution) => Msg::UpdateSolution { solution },
                    None => Msg::RandomStart,
                };
                queue(out, reply).await?;
            }
            Msg::Error { error } => {
                if swarm.report_improves(error) {
                    debug!(bot = id; "reported {error}, asking for the vector");
                    queue(out, Msg::SendSolution).await?;
                } else {
                    debug!(bot = id; "reported {error}, not an improvement");
                }
            }
            Msg::Solution { solution } => {
                if !solution.fits(job.nrow, job.ncol) {
                    warn!(bot = id; "dropping a solution with mismatched dimensions");
                    continue;
                }
                let error = solution.error;
                if swarm.accept(solution) {
                    info!(bot = id; "new swarm best: {error}");
                } else {
                    debug!(bot = id; "solution at {error} arrived too late");
                }
            }
            other => {
                warn!(bot = id; "dropping an unexpected {} message", other.kind());
            }
        }
    }
}

/// Queues one message for the writer task; a closed queue means the writer
/// hit a transport failure, which ends this connection too.
async fn queue(out: &mpsc::Sender<Msg>, msg: Msg) -> Result<(), CommsErr> {
    out.send(msg).await.map_err(|_| {
        CommsErr::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "the outbound queue is closed",
        ))
    })
}
