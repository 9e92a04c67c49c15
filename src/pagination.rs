use log::{debug, info, warn};
use scraper::{Html, Selector};

use crate::config::Timeouts;
use crate::delay_manager;
use crate::error::PageError;
use crate::extractor::{collapse, CARD_CLASS};
use crate::overlay::OverlayGuard;
use crate::page_source::{Condition, Locator, PageSource};

pub fn card_locator() -> Locator {
    Locator::css(format!("div[class=\"{}\"]", CARD_CLASS))
}

pub fn next_locator() -> Locator {
    Locator::xpath(r#"//button[@aria-label="Next"]"#)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// 1-based listing page currently rendered.
    OnPage(usize),
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    Missing,
    Disabled,
    Enabled,
}

/// Reads the "next" control's state out of listing markup.
pub fn next_control(markup: &str) -> NextControl {
    let document = Html::parse_document(markup);
    let Ok(selector) = Selector::parse(r#"button[aria-label="Next"]"#) else {
        return NextControl::Missing;
    };
    match document.select(&selector).next() {
        None => NextControl::Missing,
        Some(button) => {
            let el = button.value();
            let class_disabled = el.classes().any(|c| c == "disabled");
            if class_disabled || el.attr("disabled").is_some() {
                NextControl::Disabled
            } else {
                NextControl::Enabled
            }
        }
    }
}

/// Page number shown as active in the listing's pager, when the pager renders one.
pub fn active_page(markup: &str) -> Option<usize> {
    let document = Html::parse_document(markup);
    let selector = Selector::parse("li.page-item.active").ok()?;
    let item = document.select(&selector).next()?;
    collapse(&item.text().collect::<String>()).parse().ok()
}

/// Drives the listing from page to page until the "next" control gives out.
pub struct Paginator {
    base_url: String,
    timeouts: Timeouts,
    overlay: OverlayGuard,
    state: PageState,
}

impl Paginator {
    pub fn new(base_url: &str, timeouts: Timeouts, overlay: OverlayGuard) -> Self {
        Paginator {
            base_url: base_url.to_string(),
            timeouts,
            overlay,
            // Nothing is rendered until open() succeeds.
            state: PageState::Exhausted,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Load the base listing and wait for its first cards.
    ///
    /// A listing whose pager rendered but which has no cards is a valid, empty first page.
    pub fn open(&mut self, page: &mut dyn PageSource) -> Result<(), PageError> {
        self.state = PageState::Exhausted;
        info!("Opening listing {}", self.base_url);
        page.navigate(&self.base_url)?;
        delay_manager::settle(self.timeouts.settle);
        self.overlay.dismiss_if_present(page);
        if let Err(e) = page.wait_for(&card_locator(), Condition::Present, self.timeouts.element) {
            let markup = page.current_markup()?;
            if next_control(&markup) == NextControl::Missing {
                return Err(e);
            }
            info!("Listing rendered without any project cards");
        }
        self.state = PageState::OnPage(1);
        Ok(())
    }

    /// Move to the next listing page. Any failure along the way ends pagination.
    pub fn advance(&mut self, page: &mut dyn PageSource) -> PageState {
        let PageState::OnPage(n) = self.state else {
            return self.state;
        };
        self.state = match self.try_advance(page, n) {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not navigate to page {}: {}", n + 1, e);
                PageState::Exhausted
            }
        };
        self.state
    }

    fn try_advance(&mut self, page: &mut dyn PageSource, n: usize) -> Result<PageState, PageError> {
        let markup = page.current_markup()?;
        match next_control(&markup) {
            NextControl::Missing => {
                info!("No next control on page {}; listing exhausted", n);
                return Ok(PageState::Exhausted);
            }
            NextControl::Disabled => {
                info!("Next control disabled on page {}; listing exhausted", n);
                return Ok(PageState::Exhausted);
            }
            NextControl::Enabled => {}
        }

        self.overlay.dismiss_if_present(page);
        page.invoke(&next_locator())?;
        delay_manager::settle(self.timeouts.settle);
        self.overlay.dismiss_if_present(page);
        page.wait_for(&card_locator(), Condition::Present, self.timeouts.element)?;

        let markup = page.current_markup()?;
        match active_page(&markup) {
            Some(active) if active != n + 1 => {
                warn!("Pager shows page {} after advancing from page {}", active, n);
                Ok(PageState::Exhausted)
            }
            _ => Ok(PageState::OnPage(n + 1)),
        }
    }

    /// Make sure the live listing shows the page we believe we are on, replaying
    /// navigation from the base listing when it does not.
    pub fn realign(&mut self, page: &mut dyn PageSource) -> Result<(), PageError> {
        let PageState::OnPage(n) = self.state else {
            return Ok(());
        };

        if self.is_aligned(page, n) {
            return Ok(());
        }

        warn!("Listing lost its position; returning to page {}", n);
        self.open(page)?;
        while let PageState::OnPage(current) = self.state {
            if current == n {
                return Ok(());
            }
            self.advance(page);
        }
        Err(PageError::Navigation {
            url: self.base_url.clone(),
            reason: format!("could not return to listing page {}", n),
        })
    }

    fn is_aligned(&mut self, page: &mut dyn PageSource, n: usize) -> bool {
        if page
            .wait_for(&card_locator(), Condition::Present, self.timeouts.element)
            .is_err()
        {
            return false;
        }
        match page.current_markup() {
            Ok(markup) => match active_page(&markup) {
                Some(active) => active == n,
                None => {
                    debug!("No active page indicator; assuming page {}", n);
                    true
                }
            },
            Err(_) => false,
        }
    }
}
