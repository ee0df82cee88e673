use std::{env, process};

use bot::config::BotConfig;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match BotConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            process::exit(2);
        }
    };

    info!("bot {} solving for the boss at {}", config.name, config.boss_addr);
    if let Err(e) = bot::run::run(config).await {
        error!("bot failed: {e}");
        process::exit(1);
    }
}
