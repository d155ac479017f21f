use std::sync::Arc;
use std::time::Duration;

use devmem_store::Database;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Observations older than this many days are deleted.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Sessions still open after this many hours are ended.
    #[serde(default = "default_stale_session_hours")]
    pub stale_session_hours: u32,
    /// Seconds between scheduled runs.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Whether the server starts the background scheduler.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_age_days() -> u32 {
    90
}

fn default_stale_session_hours() -> u32 {
    24
}

fn default_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_enabled() -> bool {
    true
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            stale_session_hours: default_stale_session_hours(),
            interval_secs: default_interval_secs(),
            enabled: default_enabled(),
        }
    }
}

impl RetentionConfig {
    /// Time between scheduled runs.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Outcome of one retention pass. A `None` count means that step failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionReport {
    /// Observations removed for being older than `max_age_days`.
    pub observations_deleted: Option<usize>,
    /// Open sessions closed for being stale.
    pub sessions_ended: Option<usize>,
    /// Whether the database was compacted.
    pub vacuumed: bool,
    /// One message per failed step.
    pub errors: Vec<String>,
}

impl RetentionReport {
    /// `true` when every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Lifecycle of a background scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A retention pass is in progress.
    Running,
    /// Cancelled; no further ticks will fire.
    Stopped,
}

#[derive(Debug)]
struct SchedulerStatus {
    state: SchedulerState,
    completed_runs: u64,
}

/// Deletes aged observations, ends stale sessions and compacts the database.
pub struct Retention {
    db: Arc<Database>,
    config: RetentionConfig,
}

impl Retention {
    /// Create a retention job over `db`.
    pub fn new(db: Arc<Database>, config: RetentionConfig) -> Self {
        Self { db, config }
    }

    /// Settings this job runs with.
    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run one retention pass.
    ///
    /// Every step runs even if an earlier one fails; failures are logged and
    /// collected in the report.
    pub fn run_once(&self) -> RetentionReport {
        let mut report = RetentionReport::default();

        match self.db.delete_observations_older_than(self.config.max_age_days) {
            Ok(n) => {
                debug!(deleted = n, max_age_days = self.config.max_age_days, "Deleted old observations");
                report.observations_deleted = Some(n);
            }
            Err(e) => {
                warn!(error = %e, "Retention: deleting old observations failed");
                report.errors.push(e.to_string());
            }
        }

        match self.db.cleanup_stale_sessions(self.config.stale_session_hours) {
            Ok(n) => {
                debug!(ended = n, "Ended stale sessions");
                report.sessions_ended = Some(n);
            }
            Err(e) => {
                warn!(error = %e, "Retention: ending stale sessions failed");
                report.errors.push(e.to_string());
            }
        }

        match self.db.vacuum() {
            Ok(()) => report.vacuumed = true,
            Err(e) => {
                warn!(error = %e, "Retention: vacuum failed");
                report.errors.push(e.to_string());
            }
        }

        info!(
            observations_deleted = report.observations_deleted.unwrap_or(0),
            sessions_ended = report.sessions_ended.unwrap_or(0),
            errors = report.errors.len(),
            "Retention pass finished"
        );
        report
    }

    /// Start a background task that calls [`run_once`](Self::run_once) every
    /// `every`. The first run happens one full interval after start.
    ///
    /// Failed passes are simply retried at the next tick.
    pub fn start_scheduler(self: Arc<Self>, every: Duration) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let status = Arc::new(Mutex::new(SchedulerStatus {
            state: SchedulerState::Idle,
            completed_runs: 0,
        }));

        let task = {
            let cancel = cancel.clone();
            let status = status.clone();
            tokio::spawn(async move {
                let mut timer = tokio::time::interval_at(Instant::now() + every, every);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = timer.tick() => {}
                    }
                    if cancel.is_cancelled() {
                        break;
                    }

                    status.lock().state = SchedulerState::Running;
                    let job = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || job.run_once()).await {
                        warn!(error = %e, "Retention pass panicked");
                    }
                    {
                        let mut current = status.lock();
                        current.state = SchedulerState::Idle;
                        current.completed_runs += 1;
                    }
                }

                status.lock().state = SchedulerState::Stopped;
                info!("Retention scheduler stopped");
            })
        };

        info!(interval_secs = every.as_secs(), "Retention scheduler started");
        SchedulerHandle {
            cancel,
            status,
            task,
        }
    }
}

/// Handle to a running retention scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    status: Arc<Mutex<SchedulerStatus>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.status.lock().state
    }

    /// Number of passes that have finished.
    pub fn completed_runs(&self) -> u64 {
        self.status.lock().completed_runs
    }

    /// Cancel future ticks and wait for an in-flight pass to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Retention scheduler task failed");
        }
    }
}
