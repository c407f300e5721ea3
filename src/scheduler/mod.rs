//! Run passes once or on a fixed interval.
//!
//! Passes run on the calling thread, one after another, so at most one
//! pass is ever in flight per process. Cross-process exclusion is the
//! pass lock's job (see [`crate::store::PassLock`]).

use crate::engine::PassResult;
use crate::error::Result;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How often to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Once,
    /// Start a pass every `interval` until the process is stopped.
    Daemon { interval: Duration },
}

/// Drives a pass closure according to a [`Mode`].
#[derive(Debug, Clone)]
pub struct Scheduler {
    mode: Mode,
    max_passes: Option<u64>,
}

impl Scheduler {
    #[must_use]
    pub const fn new(mode: Mode) -> Self {
        Self {
            mode,
            max_passes: None,
        }
    }

    /// Daemon mode running every `minutes`.
    #[must_use]
    pub const fn every_minutes(minutes: u64) -> Self {
        Self::new(Mode::Daemon {
            interval: Duration::from_secs(minutes.saturating_mul(60)),
        })
    }

    /// Stop a daemon after this many passes.
    #[must_use]
    pub const fn with_max_passes(mut self, passes: u64) -> Self {
        self.max_passes = Some(passes);
        self
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Run `pass` per the mode. `report` sees every successful result.
    ///
    /// In once mode the pass's error is returned. In daemon mode a failed
    /// pass is logged and the loop waits for the next tick; the last
    /// result is returned only when a pass limit is set.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed single pass.
    pub fn run<P, R>(&self, mut pass: P, mut report: R) -> Result<Option<PassResult>>
    where
        P: FnMut() -> Result<PassResult>,
        R: FnMut(&PassResult),
    {
        let interval = match self.mode {
            Mode::Once => {
                let result = pass()?;
                report(&result);
                return Ok(Some(result));
            }
            Mode::Daemon { interval } => interval,
        };

        info!(interval_secs = interval.as_secs(), "Starting daemon");
        let mut last = None;
        let mut passes = 0u64;
        loop {
            let started = Instant::now();
            passes += 1;
            match pass() {
                Ok(result) => {
                    report(&result);
                    last = Some(result);
                }
                Err(err) => {
                    error!(pass = passes, error = %err, "Pass failed; retrying next interval");
                }
            }

            if self.max_passes.is_some_and(|max| passes >= max) {
                return Ok(last);
            }

            let elapsed = started.elapsed();
            if elapsed >= interval {
                warn!(
                    elapsed_secs = elapsed.as_secs(),
                    "Pass took longer than the interval; starting the next one now"
                );
            } else {
                thread::sleep(interval - elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PassCounts;
    use crate::error::SyncError;
    use chrono::Utc;

    fn result(created: usize) -> PassResult {
        PassResult {
            tool: "sync".to_string(),
            dry_run: false,
            actions: created,
            counts: PassCounts {
                created,
                ..PassCounts::default()
            },
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn once_runs_a_single_pass() {
        let mut calls = 0;
        let out = Scheduler::new(Mode::Once)
            .run(
                || {
                    calls += 1;
                    Ok(result(2))
                },
                |_| {},
            )
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(out.unwrap().counts.created, 2);
    }

    #[test]
    fn once_propagates_failure() {
        let err = Scheduler::new(Mode::Once)
            .run(|| Err(SyncError::transport("list_records", "timeout")), |_| {})
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn daemon_survives_failed_passes() {
        let mut calls = 0;
        let mut reported = 0;
        let out = Scheduler::new(Mode::Daemon {
            interval: Duration::ZERO,
        })
        .with_max_passes(3)
        .run(
            || {
                calls += 1;
                if calls == 2 {
                    Err(SyncError::transport("list_records", "timeout"))
                } else {
                    Ok(result(calls))
                }
            },
            |_| reported += 1,
        )
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(reported, 2);
        assert_eq!(out.unwrap().counts.created, 3);
    }

    #[test]
    fn every_minutes_builds_daemon() {
        assert_eq!(
            Scheduler::every_minutes(15).mode(),
            Mode::Daemon {
                interval: Duration::from_secs(900)
            }
        );
    }
}
