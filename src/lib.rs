pub mod browser;
pub mod config;
pub mod delay_manager;
pub mod detail;
pub mod error;
pub mod extractor;
pub mod harvester;
pub mod job_manager;
pub mod logger;
pub mod overlay;
pub mod page_source;
pub mod pagination;
pub mod record;
pub mod store;

#[cfg(test)]
mod testing;

// Exporting types for convenience
pub use browser::ChromeSession;
pub use config::{AppConfig, HarvestOptions, Timeouts};
pub use error::{HarvestError, PageError, StoreError};
pub use extractor::Extractor;
pub use harvester::{CancelToken, HarvestSummary, Harvester, StopReason};
pub use job_manager::{JobManager, RunResources};
pub use page_source::{Condition, Locator, PageSource};
pub use record::{Candidate, ProjectRecord, Promoter, PromoterDetails, StoredProject};
pub use store::{InsertOutcome, MemoryStore, ProjectStore, SqliteStore};
