//! The seam between the harvester and whatever renders the registry pages.
//!
//! Components never hold element handles across calls. Every action is expressed
//! as a [`Locator`] that is resolved against the live page at the moment of the call.

use std::fmt;
use std::time::Duration;

use crate::error::PageError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
    LinkText(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn link_text(text: impl Into<String>) -> Self {
        Locator::LinkText(text.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{}`", s),
            Locator::XPath(s) => write!(f, "xpath `{}`", s),
            Locator::LinkText(s) => write!(f, "link `{}`", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Present,
    Clickable,
    Absent,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::Present => "present",
            Condition::Clickable => "clickable",
            Condition::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// A controllable, browser-like session.
///
/// All calls block the caller. Implementations must bound every wait; nothing
/// here is allowed to hang indefinitely.
pub trait PageSource {
    /// Load `url` and block until the document is interactive.
    fn navigate(&mut self, url: &str) -> Result<(), PageError>;

    /// Rendered markup as of this call. Callers await readiness first.
    fn current_markup(&mut self) -> Result<String, PageError>;

    fn wait_for(
        &mut self,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> Result<(), PageError>;

    /// Click the first element matching `locator` via script dispatch, so an
    /// overlapping element cannot swallow the event.
    fn invoke(&mut self, locator: &Locator) -> Result<(), PageError>;

    /// Step back one entry in the session history.
    fn back(&mut self) -> Result<(), PageError>;
}
