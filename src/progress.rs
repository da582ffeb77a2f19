//! Batch run progress reporting.
//!
//! Reports observable progress during `petprice run` so users see which job
//! is being fetched and how many stores answered. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a batch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunProgressEvent {
    /// Job `job` (1-based) of `total` was broadcast to the stores.
    Dispatching {
        job: usize,
        total: usize,
        code: String,
    },
    /// Collection for a job closed: `responded` of `expected` stores answered.
    Collected {
        job: usize,
        total: usize,
        responded: usize,
        expected: usize,
        listings: usize,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait RunProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the batch pipeline.
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "run  12 / 200  NX-003-G  3/4 stores, 3 listings".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Dispatching { job, total, code } => {
                format!(
                    "run  {} / {}  {}  fetching...\n",
                    format_number(*job as u64),
                    format_number(*total as u64),
                    code
                )
            }
            RunProgressEvent::Collected {
                job,
                total,
                responded,
                expected,
                listings,
            } => format!(
                "run  {} / {}  {}/{} stores, {} listings\n",
                format_number(*job as u64),
                format_number(*total as u64),
                responded,
                expected,
                listings
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Dispatching { job, total, code } => serde_json::json!({
                "event": "progress",
                "phase": "dispatching",
                "job": job,
                "total": total,
                "code": code
            }),
            RunProgressEvent::Collected {
                job,
                total,
                responded,
                expected,
                listings,
            } => serde_json::json!({
                "event": "progress",
                "phase": "collected",
                "job": job,
                "total": total,
                "responded": responded,
                "expected": expected,
                "listings": listings
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
