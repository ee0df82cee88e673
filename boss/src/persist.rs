use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use comms::msg::Solution;

/// Append-only journal of broadcast solutions, one JSON object per line.
///
/// The newest line is the swarm's final answer; earlier lines preserve the
/// improvement trail for post-hoc inspection and for `--resume`.
#[derive(Debug, Clone)]
pub struct SolutionLog {
    path: PathBuf,
}

impl SolutionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one solution as a single line.
    pub fn append(&self, solution: &Solution) -> io::Result<()> {
        let mut line = serde_json::to_string(solution).map_err(io::Error::other)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// The most recently appended solution, or `None` when the log does not
    /// exist yet or holds nothing.
    pub fn load_latest(&self) -> io::Result<Option<Solution>> {
        self.load_nth_back(0)
    }

    /// The `n`-th solution counting back from the newest.
    pub fn load_nth_back(&self, n: usize) -> io::Result<Option<Solution>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(line) = text.lines().filter(|l| !l.trim().is_empty()).rev().nth(n) else {
            return Ok(None);
        };

        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn scratch_log(tag: &str) -> SolutionLog {
        let path = env::temp_dir().join(format!("boss-solutions-{tag}-{}.jsonl", std::process::id()));
        let _ = fs::remove_file(&path);
        SolutionLog::new(path)
    }

    fn solution(error: f64) -> Solution {
        Solution {
            rx: vec![0.5, -0.5],
            cx: vec![0.25, -0.25],
            rm: vec![1.0, 2.0],
            cm: vec![2.0, 1.0],
            a: 1.5,
            error,
            timestamp: 42,
        }
    }

    #[test]
    fn appends_and_reloads_in_order() {
        let log = scratch_log("order");

        assert_eq!(log.load_latest().unwrap(), None);

        log.append(&solution(9.0)).unwrap();
        log.append(&solution(4.0)).unwrap();
        log.append(&solution(1.5)).unwrap();

        assert_eq!(log.load_latest().unwrap(), Some(solution(1.5)));
        assert_eq!(log.load_nth_back(1).unwrap(), Some(solution(4.0)));
        assert_eq!(log.load_nth_back(2).unwrap(), Some(solution(9.0)));
        assert_eq!(log.load_nth_back(3).unwrap(), None);

        let _ = fs::remove_file(log.path());
    }

    #[test]
    fn corrupted_lines_surface_as_errors() {
        let log = scratch_log("corrupt");
        fs::write(log.path(), "{ not json\n").unwrap();

        let err = log.load_latest().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let _ = fs::remove_file(log.path());
    }
}
