use std::time::Duration;
use thiserror::Error;

use crate::page_source::{Condition, Locator};

/// Failures raised by a renderable page session.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {waited:?} waiting for {locator} to be {condition}")]
    Timeout {
        locator: Locator,
        condition: Condition,
        waited: Duration,
    },
    #[error("could not act on {locator}: {reason}")]
    Action { locator: Locator, reason: String },
    #[error("browser session error: {0}")]
    Session(String),
}

impl PageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Timeout { .. })
    }
}

/// A required field was missing from a listing card or detail view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("missing {field} in {context}")]
pub struct ExtractionError {
    pub field: &'static str,
    pub context: String,
}

impl ExtractionError {
    pub fn new(field: &'static str, context: impl Into<String>) -> Self {
        ExtractionError {
            field,
            context: context.into(),
        }
    }
}

/// Fatal to one candidate only.
#[derive(Debug, Error)]
pub enum DrillDownError {
    #[error("candidate '{name}': {source}")]
    Page {
        name: String,
        #[source]
        source: PageError,
    },
    #[error("candidate '{name}': card at position {position} now carries {found:?}, expected {expected}")]
    KeyMismatch {
        name: String,
        position: usize,
        expected: String,
        found: Option<String>,
    },
}

impl DrillDownError {
    pub fn page(name: &str, source: PageError) -> Self {
        DrillDownError::Page {
            name: name.to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("page bound must be at least 1")]
    ZeroPages,
}

/// Run-level failures: the harvest could not start or could not safely continue.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
