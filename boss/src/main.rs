use std::{env, fs, process, time::Duration};

use comms::msg::Msg;
use log::{error, info};
use solver::FrequencyTable;
use tokio::{net::TcpListener, signal, time};

use boss::{
    Result, broadcast, config::BossConfig, persist::SolutionLog, server, state::SwarmHandle,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match BossConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(usage) => {
            eprintln!("{usage}");
            process::exit(2);
        }
    };

    if let Err(e) = run(config).await {
        error!("boss failed: {e}");
        process::exit(1);
    }
}

async fn run(config: BossConfig) -> Result<()> {
    let text = fs::read_to_string(&config.table_path)?;
    let table = FrequencyTable::from_csv_str(&text)?;
    info!(
        "loaded a {}x{} table from {}",
        table.nrow(),
        table.ncol(),
        config.table_path.display()
    );

    let job = server::job_data(&table);
    let swarm = SwarmHandle::new();
    let log = SolutionLog::new(&config.output_path);

    if config.resume {
        match log.load_latest()? {
            Some(solution) => {
                info!(error = solution.error; "resuming from the logged best");
                swarm.seed(solution);
            }
            None => info!("nothing to resume from at {}", config.output_path.display()),
        }
    }

    let listener = TcpListener::bind(config.addr()).await?;
    info!("listening at {}", config.addr());

    let broadcaster = tokio::spawn(broadcast::run(
        swarm.clone(),
        log,
        config.broadcast_interval,
    ));

    tokio::select! {
        ret = server::serve(listener, swarm.clone(), job) => ret?,
        _ = signal::ctrl_c() => {
            info!("shutdown signal received, telling bots to quit");
            for sender in swarm.senders() {
                let _ = sender.try_send(Msg::Quit);
            }
            // Give the writer tasks a moment to flush the quits.
            time::sleep(Duration::from_millis(200)).await;
        }
    }

    broadcaster.abort();
    Ok(())
}
