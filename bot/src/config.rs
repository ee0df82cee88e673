use std::env;
use std::time::Duration;

use rand::Rng;
use solver::SolverOptions;

pub const DEFAULT_BOSS_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_TRIES: usize = 20;
const DEFAULT_SHORT_ITERATIONS: usize = 2;

const USAGE: &str = "usage: bot [ADDR] [--name NAME] [--report-interval SECS] \
[--seed SEED] [--tries N] [--short-iterations N] [--fixed-order]";

/// Runtime settings for one bot, from the command line with environment
/// fallbacks.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub boss_addr: String,
    pub name: String,
    pub report_interval: Duration,
    pub reconnect_backoff: Duration,
    pub max_backoff: Duration,
    pub seed: Option<u64>,
    pub shuffle: bool,
    pub tries: usize,
    pub short_iterations: usize,
}

impl BotConfig {
    /// Defaults against the given boss address. The name gets a random
    /// suffix so a swarm started from one script stays distinguishable.
    pub fn new(boss_addr: impl Into<String>) -> Self {
        let suffix: u32 = rand::rng().random_range(0..1000);
        Self {
            boss_addr: boss_addr.into(),
            name: format!("bot-{suffix}"),
            report_interval: DEFAULT_REPORT_INTERVAL,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            max_backoff: MAX_RECONNECT_BACKOFF,
            seed: None,
            shuffle: true,
            tries: DEFAULT_TRIES,
            short_iterations: DEFAULT_SHORT_ITERATIONS,
        }
    }

    /// Parses command line arguments (without the program name). The boss
    /// address may come positionally, from `BOSS_ADDR`, or default to
    /// localhost.
    pub fn from_args<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let addr = env::var("BOSS_ADDR").unwrap_or_else(|_| DEFAULT_BOSS_ADDR.to_string());
        let mut config = Self::new(addr);
        let mut positional_seen = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--name" => config.name = take_value(&mut args, "--name")?,
                "--report-interval" => {
                    let secs: f64 = parse_value(&mut args, "--report-interval")?;
                    if !secs.is_finite() || secs < 0.0 {
                        return Err(format!("invalid --report-interval: {secs}\n{USAGE}"));
                    }
                    config.report_interval = Duration::from_secs_f64(secs);
                }
                "--seed" => config.seed = Some(parse_value(&mut args, "--seed")?),
                "--tries" => config.tries = parse_value(&mut args, "--tries")?,
                "--short-iterations" => {
                    config.short_iterations = parse_value(&mut args, "--short-iterations")?;
                }
                "--fixed-order" => config.shuffle = false,
                flag if flag.starts_with("--") => {
                    return Err(format!("unknown flag: {flag}\n{USAGE}"));
                }
                addr => {
                    if positional_seen {
                        return Err(format!("unexpected argument: {addr}\n{USAGE}"));
                    }
                    positional_seen = true;
                    config.boss_addr = addr.to_string();
                }
            }
        }

        Ok(config)
    }

    /// Options handed to every multi-start the solve loop runs.
    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            shuffle: self.shuffle,
            tries: self.tries,
            short_iterations: self.short_iterations,
            seed: self.seed,
        }
    }
}

fn take_value<I>(args: &mut I, flag: &str) -> Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or_else(|| format!("{flag} needs a value\n{USAGE}"))
}

fn parse_value<I, T>(args: &mut I, flag: &str) -> Result<T, String>
where
    I: Iterator<Item = String>,
    T: std::str::FromStr,
{
    let raw = take_value(args, flag)?;
    raw.parse()
        .map_err(|_| format!("invalid value for {flag}: {raw}\n{USAGE}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_address_and_flags() {
        let config = BotConfig::from_args(args(&[
            "10.0.0.7:6000",
            "--name",
            "crunch",
            "--tries",
            "5",
            "--short-iterations",
            "3",
            "--seed",
            "42",
            "--fixed-order",
        ]))
        .unwrap();

        assert_eq!(config.boss_addr, "10.0.0.7:6000");
        assert_eq!(config.name, "crunch");
        assert_eq!(config.tries, 5);
        assert_eq!(config.short_iterations, 3);
        assert_eq!(config.seed, Some(42));
        assert!(!config.shuffle);
    }

    #[test]
    fn report_interval_accepts_fractions() {
        let config =
            BotConfig::from_args(args(&["--report-interval", "0.5"])).unwrap();
        assert_eq!(config.report_interval, Duration::from_millis(500));
    }

    #[test]
    fn rejects_unknown_flags_and_extra_positionals() {
        assert!(BotConfig::from_args(args(&["--frobnicate"])).is_err());
        assert!(BotConfig::from_args(args(&["a:1", "b:2"])).is_err());
        assert!(BotConfig::from_args(args(&["--seed", "not-a-number"])).is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let config = BotConfig::new("127.0.0.1:5000");
        assert!(config.name.starts_with("bot-"));
        assert!(config.shuffle);
        assert_eq!(config.tries, 20);
        assert_eq!(config.short_iterations, 2);
    }
}
