use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::config::HarvestOptions;
use crate::detail::DetailDrillDown;
use crate::error::HarvestError;
use crate::extractor::Extractor;
use crate::overlay::OverlayGuard;
use crate::page_source::PageSource;
use crate::pagination::{PageState, Paginator};
use crate::record::ProjectRecord;
use crate::store::{InsertOutcome, ProjectStore};

/// Cooperative stop signal, checked between candidates and between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum StopReason {
    Exhausted,
    PageLimit,
    Cancelled,
    Aborted(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_visited: usize,
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub stop_reason: Option<StopReason>,
}

impl HarvestSummary {
    fn start(run_id: Uuid) -> Self {
        HarvestSummary {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            pages_visited: 0,
            inserted: 0,
            skipped_duplicate: 0,
            failed: 0,
            stop_reason: None,
        }
    }

    fn finish(mut self, reason: StopReason) -> Self {
        self.finished_at = Some(Utc::now());
        self.stop_reason = Some(reason);
        self
    }

    pub fn aborted(&self) -> bool {
        matches!(self.stop_reason, Some(StopReason::Aborted(_)))
    }
}

enum PageOutcome {
    Complete,
    Cancelled,
}

/// Composes pagination, extraction, drill-down and persistence into one sequential run.
pub struct Harvester {
    options: HarvestOptions,
    extractor: Extractor,
    overlay: OverlayGuard,
    run_id: Option<Uuid>,
}

impl Harvester {
    pub fn new(options: HarvestOptions) -> Self {
        let overlay = OverlayGuard::new(options.timeouts.overlay);
        Harvester {
            options,
            extractor: Extractor::new(),
            overlay,
            run_id: None,
        }
    }

    /// Report under a caller-chosen id instead of a fresh one.
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Run to completion. The session and store are exclusively borrowed for the whole run.
    ///
    /// `progress` is called after every page has been committed.
    pub fn run(
        &self,
        page: &mut dyn PageSource,
        store: &mut dyn ProjectStore,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(&HarvestSummary),
    ) -> HarvestSummary {
        let mut summary = HarvestSummary::start(self.run_id.unwrap_or_else(Uuid::new_v4));
        info!(
            "Starting harvest {} of up to {} pages from {}",
            summary.run_id, self.options.max_pages, self.options.base_url
        );

        let mut nav = Paginator::new(&self.options.base_url, self.options.timeouts, self.overlay.clone());
        if let Err(e) = nav.open(page) {
            error!("Could not open listing: {}", e);
            return self.finish(summary, StopReason::Aborted(e.to_string()));
        }

        let reason = loop {
            let PageState::OnPage(n) = nav.state() else {
                break StopReason::Exhausted;
            };
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            info!("Scraping page {}...", n);
            summary.pages_visited += 1;
            let outcome = self.harvest_page(page, store, &mut nav, cancel, &mut summary);

            // Commit whatever this page produced before deciding anything else.
            if let Err(e) = store.commit() {
                error!("Commit failed after page {}: {}", n, e);
                break StopReason::Aborted(e.to_string());
            }
            progress(&summary);

            match outcome {
                Ok(PageOutcome::Complete) => {}
                Ok(PageOutcome::Cancelled) => break StopReason::Cancelled,
                Err(e) => {
                    error!("Aborting run on page {}: {}", n, e);
                    break StopReason::Aborted(e.to_string());
                }
            }

            if summary.pages_visited >= self.options.max_pages {
                break StopReason::PageLimit;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            nav.advance(page);
        };

        self.finish(summary, reason)
    }

    fn harvest_page(
        &self,
        page: &mut dyn PageSource,
        store: &mut dyn ProjectStore,
        nav: &mut Paginator,
        cancel: &CancelToken,
        summary: &mut HarvestSummary,
    ) -> Result<PageOutcome, HarvestError> {
        let markup = page.current_markup()?;
        let listing = self.extractor.parse_listing(&markup);
        summary.failed += listing.failures.len();

        let drill = DetailDrillDown::new(&self.extractor, &self.overlay, self.options.timeouts.element);

        for candidate in listing.candidates {
            if cancel.is_cancelled() {
                info!("Cancellation requested; stopping before '{}'", candidate.name);
                return Ok(PageOutcome::Cancelled);
            }

            if store.exists(&candidate.natural_key)? {
                info!("Skipped (already exists): {}", candidate.name);
                summary.skipped_duplicate += 1;
                continue;
            }

            let details = drill.drill(page, &candidate);
            let realigned = nav.realign(page);

            match details {
                Ok(details) => {
                    let name = candidate.name.clone();
                    let record = ProjectRecord::assemble(candidate, Some(details));
                    match store.insert(&record)? {
                        InsertOutcome::Inserted => {
                            info!("Inserted: {}", name);
                            summary.inserted += 1;
                        }
                        InsertOutcome::AlreadyPresent => {
                            info!("Skipped (already exists): {}", name);
                            summary.skipped_duplicate += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed: {}", e);
                    summary.failed += 1;
                }
            }

            realigned?;
        }

        Ok(PageOutcome::Complete)
    }

    fn finish(&self, summary: HarvestSummary, reason: StopReason) -> HarvestSummary {
        let summary = summary.finish(reason);
        info!(
            "Harvest {} finished ({:?}): {} pages, {} inserted, {} skipped, {} failed",
            summary.run_id,
            summary.stop_reason,
            summary.pages_visited,
            summary.inserted,
            summary.skipped_duplicate,
            summary.failed
        );
        summary
    }
}
