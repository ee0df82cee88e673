use std::{env, path::PathBuf, time::Duration};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_OUTPUT: &str = "solutions.jsonl";
const DEFAULT_BROADCAST_SECS: u64 = 5;

/// Runtime settings for the boss process.
///
/// Flags win over the `HOST`/`PORT` environment variables, which win over
/// the defaults.
#[derive(Debug, Clone)]
pub struct BossConfig {
    pub table_path: PathBuf,
    pub output_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub broadcast_interval: Duration,
    pub resume: bool,
}

impl BossConfig {
    /// Parses command line arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut table_path: Option<PathBuf> = None;
        let mut output_path = PathBuf::from(DEFAULT_OUTPUT);
        let mut host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let mut port = match env::var("PORT") {
            Ok(value) => parse(&value, "PORT")?,
            Err(_) => DEFAULT_PORT,
        };
        let mut broadcast_secs = DEFAULT_BROADCAST_SECS;
        let mut resume = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" => host = value_of(&mut args, "--host")?,
                "--port" => port = parse(&value_of(&mut args, "--port")?, "--port")?,
                "--output" => output_path = value_of(&mut args, "--output")?.into(),
                "--broadcast-interval" => {
                    broadcast_secs = parse(
                        &value_of(&mut args, "--broadcast-interval")?,
                        "--broadcast-interval",
                    )?;
                }
                "--resume" => resume = true,
                other if other.starts_with('-') => {
                    return Err(usage(&format!("unknown flag {other}")));
                }
                _ if table_path.is_some() => {
                    return Err(usage("more than one table path given"));
                }
                _ => table_path = Some(arg.into()),
            }
        }

        let Some(table_path) = table_path else {
            return Err(usage("missing the table path"));
        };

        Ok(Self {
            table_path,
            output_path,
            host,
            port,
            broadcast_interval: Duration::from_secs(broadcast_secs),
            resume,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn value_of<I>(args: &mut I, flag: &str) -> Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or_else(|| usage(&format!("{flag} needs a value")))
}

fn parse<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| usage(&format!("bad {what} value {value:?}: {e}")))
}

fn usage(detail: &str) -> String {
    format!(
        "{detail}\n\
         usage: boss <table.csv> [--host HOST] [--port PORT] [--output FILE] \
         [--broadcast-interval SECS] [--resume]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_a_full_command_line() {
        let config = BossConfig::from_args(args(&[
            "tables/input.csv",
            "--port",
            "6001",
            "--host",
            "0.0.0.0",
            "--output",
            "best.jsonl",
            "--broadcast-interval",
            "2",
            "--resume",
        ]))
        .unwrap();

        assert_eq!(config.table_path, PathBuf::from("tables/input.csv"));
        assert_eq!(config.output_path, PathBuf::from("best.jsonl"));
        assert_eq!(config.addr(), "0.0.0.0:6001");
        assert_eq!(config.broadcast_interval, Duration::from_secs(2));
        assert!(config.resume);
    }

    #[test]
    fn defaults_fill_the_rest() {
        let config = BossConfig::from_args(args(&["table.csv"])).unwrap();

        assert_eq!(config.output_path, PathBuf::from("solutions.jsonl"));
        assert_eq!(config.broadcast_interval, Duration::from_secs(5));
        assert!(!config.resume);
    }

    #[test]
    fn rejects_missing_table_and_unknown_flags() {
        assert!(BossConfig::from_args(args(&[])).is_err());
        assert!(BossConfig::from_args(args(&["t.csv", "--verbose"])).is_err());
        assert!(BossConfig::from_args(args(&["t.csv", "--port"])).is_err());
        assert!(BossConfig::from_args(args(&["t.csv", "--port", "70000"])).is_err());
        assert!(BossConfig::from_args(args(&["a.csv", "b.csv"])).is_err());
    }
}
