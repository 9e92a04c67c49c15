use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use chrono::Local;
use log::{error, info};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::browser::ChromeSession;
use crate::config::{AppConfig, HarvestOptions};
use crate::error::HarvestError;
use crate::harvester::{CancelToken, HarvestSummary, Harvester, StopReason};
use crate::page_source::PageSource;
use crate::store::{ProjectStore, SqliteStore};

const MAX_LOG_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunState {
    pub fn is_finished(self) -> bool {
        matches!(self, RunState::Completed | RunState::Stopped | RunState::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub id: Uuid,
    pub state: RunState,
    pub pages_requested: usize,
    /// Latest counts; final once the run has finished.
    pub summary: Option<HarvestSummary>,
    pub logs: Vec<String>,
}

impl RunStatus {
    fn queued(id: Uuid, pages_requested: usize) -> Self {
        RunStatus {
            id,
            state: RunState::Queued,
            pages_requested,
            summary: None,
            logs: vec![format!("{} Run queued.", timestamp())],
        }
    }

    fn log(&mut self, message: impl AsRef<str>) {
        self.logs.push(format!("{} {}", timestamp(), message.as_ref()));
        if self.logs.len() > MAX_LOG_LINES {
            self.logs.remove(0);
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Everything a run needs, opened fresh for each run so nothing is shared between runs.
pub trait RunResources: Send + Sync {
    fn options(&self, pages: usize) -> Result<HarvestOptions, HarvestError>;
    fn open_session(&self) -> Result<Box<dyn PageSource>, HarvestError>;
    fn open_store(&self) -> Result<Box<dyn ProjectStore>, HarvestError>;
}

/// Headless Chrome plus the SQLite store named by the configuration.
pub struct ChromeResources {
    config: AppConfig,
}

impl ChromeResources {
    pub fn new(config: AppConfig) -> Self {
        ChromeResources { config }
    }
}

impl RunResources for ChromeResources {
    fn options(&self, pages: usize) -> Result<HarvestOptions, HarvestError> {
        Ok(HarvestOptions::new(&self.config, pages)?)
    }

    fn open_session(&self) -> Result<Box<dyn PageSource>, HarvestError> {
        Ok(Box::new(ChromeSession::launch(&self.config)?))
    }

    fn open_store(&self) -> Result<Box<dyn ProjectStore>, HarvestError> {
        Ok(Box::new(SqliteStore::open(&self.config.db_path)?))
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a harvest run is already in progress ({0})")]
    AlreadyRunning(Uuid),
    #[error(transparent)]
    Invalid(#[from] HarvestError),
}

struct ActiveRun {
    id: Uuid,
    cancel: CancelToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the single-run slot when the run thread exits, however it exits.
struct ActiveGuard {
    active: Arc<Mutex<Option<ActiveRun>>>,
    status: Arc<Mutex<Option<RunStatus>>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Some(status) = lock(&self.status).as_mut() {
            if !status.state.is_finished() {
                status.state = RunState::Failed;
                status.log("Run ended unexpectedly.");
            }
        }
        *lock(&self.active) = None;
    }
}

/// Owns the single harvest slot: at most one run at a time, each on its own thread.
pub struct JobManager {
    resources: Arc<dyn RunResources>,
    status: Arc<Mutex<Option<RunStatus>>>,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl JobManager {
    pub fn new(resources: Arc<dyn RunResources>) -> Self {
        JobManager {
            resources,
            status: Arc::new(Mutex::new(None)),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn resources(&self) -> Arc<dyn RunResources> {
        self.resources.clone()
    }

    pub fn start_run(&self, pages: usize) -> Result<Uuid, StartError> {
        let options = self.resources.options(pages)?;

        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        {
            let mut active = lock(&self.active);
            if let Some(run) = active.as_ref() {
                return Err(StartError::AlreadyRunning(run.id));
            }
            *active = Some(ActiveRun {
                id,
                cancel: cancel.clone(),
            });
        }
        *lock(&self.status) = Some(RunStatus::queued(id, pages));

        let guard = ActiveGuard {
            active: self.active.clone(),
            status: self.status.clone(),
        };
        let resources = self.resources.clone();
        let status = self.status.clone();

        thread::spawn(move || {
            let _guard = guard;
            Self::run_harvest(id, resources, options, status, cancel);
        });

        info!("Queued harvest run {} for {} pages", id, pages);
        Ok(id)
    }

    /// Ask the active run to stop at its next candidate or page boundary.
    pub fn stop(&self) -> Option<Uuid> {
        let active = lock(&self.active);
        let run = active.as_ref()?;
        run.cancel.cancel();
        info!("Stop requested for run {}", run.id);
        Some(run.id)
    }

    pub fn status(&self) -> Option<RunStatus> {
        lock(&self.status).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    fn run_harvest(
        id: Uuid,
        resources: Arc<dyn RunResources>,
        options: HarvestOptions,
        status: Arc<Mutex<Option<RunStatus>>>,
        cancel: CancelToken,
    ) {
        let update = |f: &mut dyn FnMut(&mut RunStatus)| {
            if let Some(s) = lock(&status).as_mut() {
                f(s);
            }
        };
        let fail = |stage: &str, e: HarvestError| {
            error!("Run {} failed to {}: {}", id, stage, e);
            update(&mut |s| {
                s.state = RunState::Failed;
                s.log(format!("Failed to {}: {}", stage, e));
            });
        };

        update(&mut |s| {
            s.state = RunState::Running;
            s.log("Run started.");
        });

        let mut store = match resources.open_store() {
            Ok(store) => store,
            Err(e) => return fail("open store", e),
        };
        let mut session = match resources.open_session() {
            Ok(session) => session,
            Err(e) => return fail("start browser", e),
        };

        let harvester = Harvester::new(options).with_run_id(id);
        let summary = harvester.run(session.as_mut(), store.as_mut(), &cancel, &mut |progress| {
            update(&mut |s| {
                s.log(format!(
                    "Page {} done: {} inserted, {} skipped, {} failed so far.",
                    progress.pages_visited, progress.inserted, progress.skipped_duplicate, progress.failed
                ));
                s.summary = Some(progress.clone());
            })
        });
        drop(session);

        let state = match &summary.stop_reason {
            Some(StopReason::Cancelled) => RunState::Stopped,
            Some(StopReason::Aborted(_)) => RunState::Failed,
            _ => RunState::Completed,
        };
        update(&mut |s| {
            s.state = state;
            s.log(format!(
                "Run finished: {} inserted, {} skipped, {} failed.",
                summary.inserted, summary.skipped_duplicate, summary.failed
            ));
            s.summary = Some(summary.clone());
        });
    }
}
