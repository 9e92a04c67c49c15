//! Scripted registry used by the unit tests: listing pages, detail views, overlays and
//! a pager, all served from memory through [`PageSource`].

use std::time::Duration;

use crate::config::Timeouts;
use crate::detail::{
    promoter_marker_locator, promoter_tab_locator, tab_bar_locator, view_details_locator,
};
use crate::error::PageError;
use crate::extractor::{
    CARD_CLASS, LABEL_COMPANY_NAME, LABEL_CORRESPONDENCE_ADDRESS, LABEL_EMAIL, LABEL_ENTITY,
    LABEL_GST_NO, LABEL_MOBILE, LABEL_REGISTERED_ADDRESS, LABEL_REGISTRATION_NO, LABEL_TELEPHONE,
};
use crate::overlay::{confirm_locator, overlay_locator};
use crate::page_source::{Condition, Locator, PageSource};
use crate::pagination::{card_locator, next_locator};

pub const BASE_URL: &str = "http://registry.test/projects/project-list";

const DETAIL_LABELS: [&str; 9] = [
    LABEL_COMPANY_NAME,
    LABEL_REGISTRATION_NO,
    LABEL_CORRESPONDENCE_ADDRESS,
    LABEL_REGISTERED_ADDRESS,
    LABEL_ENTITY,
    LABEL_EMAIL,
    LABEL_MOBILE,
    LABEL_TELEPHONE,
    LABEL_GST_NO,
];

pub fn timeouts() -> Timeouts {
    Timeouts {
        page_load: Duration::ZERO,
        element: Duration::ZERO,
        overlay: Duration::ZERO,
        settle: Duration::ZERO,
    }
}

#[derive(Debug, Clone)]
pub struct CardSpec {
    pub name: String,
    pub key: Option<String>,
    pub promoter: String,
    pub address: Option<String>,
    pub missing_detail: Vec<&'static str>,
    pub broken_detail: bool,
}

impl CardSpec {
    pub fn new(name: &str, key: &str) -> Self {
        CardSpec {
            name: name.to_string(),
            key: Some(key.to_string()),
            promoter: format!("Promoter of {}", name),
            address: Some(format!("Address of {}", name)),
            missing_detail: Vec::new(),
            broken_detail: false,
        }
    }

    pub fn promoter(mut self, promoter: &str) -> Self {
        self.promoter = promoter.to_string();
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn without_address(mut self) -> Self {
        self.address = None;
        self
    }

    pub fn without_key(mut self) -> Self {
        self.key = None;
        self
    }

    pub fn missing_detail(mut self, label: &'static str) -> Self {
        self.missing_detail.push(label);
        self
    }

    /// The detail view never renders its tab bar.
    pub fn broken_detail(mut self) -> Self {
        self.broken_detail = true;
        self
    }
}

/// `pages` listing pages of `per_page` well-formed cards each.
pub fn pages_of(pages: usize, per_page: usize) -> Vec<Vec<CardSpec>> {
    (1..=pages)
        .map(|p| {
            (1..=per_page)
                .map(|i| {
                    CardSpec::new(&format!("Project {}-{}", p, i), &format!("RP/{:02}/{:03}", p, i))
                })
                .collect()
        })
        .collect()
}

pub fn card_html(card: &CardSpec) -> String {
    let address = card
        .address
        .as_ref()
        .map(|a| format!("<div class=\"col\"><label>Address</label><strong>{}</strong></div>", a))
        .unwrap_or_default();
    let key = card
        .key
        .as_ref()
        .map(|k| format!("<div>RERA Regd. No. <span class=\"fw-bold\">{}</span></div>", k))
        .unwrap_or_default();
    format!(
        r#"<div class="{class}">
  <div class="card-body">
    <h5 class="card-title">{name}</h5>
    <small>by {promoter}</small>
    {address}
    {key}
    <a href="javascript:void(0)" class="btn btn-primary">View Details</a>
  </div>
</div>"#,
        class = CARD_CLASS,
        name = card.name,
        promoter = card.promoter,
        address = address,
        key = key,
    )
}

pub fn listing_html(cards: &[CardSpec], active: Option<usize>, next_disabled: bool) -> String {
    let body: String = cards.iter().map(card_html).collect();
    let pager = active
        .map(|p| format!("<li class=\"page-item active\"><span class=\"page-link\">{}</span></li>", p))
        .unwrap_or_default();
    let disabled = if next_disabled { " disabled" } else { "" };
    format!(
        r#"<html><body>
<div class="project-list">{body}</div>
<ul class="pagination">{pager}</ul>
<button aria-label="Next" class="page-link{disabled}">Next</button>
</body></html>"#
    )
}

fn detail_value(label: &str, key: &str) -> String {
    match label {
        LABEL_COMPANY_NAME => format!("Company of {}", key),
        LABEL_GST_NO => format!("GST-{}", key),
        other => format!("{} of {}", other, key),
    }
}

fn detail_markup(key: &str, missing: &[&str], promoter_tab_open: bool) -> String {
    let fields: String = if promoter_tab_open {
        DETAIL_LABELS
            .iter()
            .filter(|label| !missing.contains(*label))
            .map(|label| {
                format!(
                    "<div class=\"col-md-4\"><label>{}</label><strong>{}</strong></div>",
                    label,
                    detail_value(label, key)
                )
            })
            .collect()
    } else {
        String::new()
    };
    format!(
        r#"<html><body>
<ul class="nav nav-tabs"><li><a>Project Overview</a></li><li><a>Promoter Details</a></li></ul>
<div class="tab-content">{fields}</div>
</body></html>"#
    )
}

/// A detail view with the promoter tab already open.
pub fn detail_html(key: &str, missing: &[&str]) -> String {
    detail_markup(key, missing, true)
}

#[derive(Debug, Clone, PartialEq)]
enum View {
    Blank,
    Listing(usize),
    Detail {
        page: usize,
        card: usize,
        promoter_tab: bool,
    },
}

pub struct FakeSite {
    pages: Vec<Vec<CardSpec>>,
    view: View,
    overlays: bool,
    stuck_overlay: bool,
    overlay_visible: bool,
    next_disabled_on: Option<usize>,
    next_stalls_on: Option<usize>,
    navigation_fails: bool,
    pub visited_pages: Vec<usize>,
    pub overlays_dismissed: usize,
    pub detail_views_opened: usize,
}

impl FakeSite {
    pub fn new(pages: Vec<Vec<CardSpec>>) -> Self {
        FakeSite {
            pages,
            view: View::Blank,
            overlays: false,
            stuck_overlay: false,
            overlay_visible: false,
            next_disabled_on: None,
            next_stalls_on: None,
            navigation_fails: false,
            visited_pages: Vec::new(),
            overlays_dismissed: 0,
            detail_views_opened: 0,
        }
    }

    /// Show a confirmation overlay after every navigation.
    pub fn with_overlays(mut self) -> Self {
        self.overlays = true;
        self
    }

    pub fn with_stuck_overlay(mut self) -> Self {
        self.stuck_overlay = true;
        self
    }

    pub fn with_next_disabled_on(mut self, page: usize) -> Self {
        self.next_disabled_on = Some(page);
        self
    }

    /// Clicking "next" on `page` succeeds but the following page never renders.
    pub fn with_next_stalling_on(mut self, page: usize) -> Self {
        self.next_stalls_on = Some(page);
        self
    }

    pub fn with_navigation_failure(mut self) -> Self {
        self.navigation_fails = true;
        self
    }

    pub fn replace_page(&mut self, page: usize, cards: Vec<CardSpec>) {
        self.pages[page - 1] = cards;
    }

    /// The registry's scripts dropping back to the first page.
    pub fn reset_to_first_page(&mut self) {
        self.view = View::Listing(1);
    }

    pub fn current_listing_page(&self) -> Option<usize> {
        match self.view {
            View::Listing(p) => Some(p),
            _ => None,
        }
    }

    fn next_disabled(&self, page: usize) -> bool {
        page >= self.pages.len() || self.next_disabled_on == Some(page)
    }

    fn raise_overlay(&mut self) {
        if self.overlays {
            self.overlay_visible = true;
        }
    }

    fn present(&self, locator: &Locator) -> bool {
        if *locator == confirm_locator() || *locator == overlay_locator() {
            return self.overlay_visible;
        }
        match &self.view {
            View::Blank => false,
            View::Listing(p) => {
                let cards = &self.pages[p - 1];
                if *locator == card_locator() {
                    return !cards.is_empty();
                }
                if *locator == next_locator() {
                    return true;
                }
                (0..cards.len()).any(|i| *locator == view_details_locator(i))
            }
            View::Detail {
                page,
                card,
                promoter_tab,
            } => {
                let spec = &self.pages[page - 1][*card];
                if spec.broken_detail {
                    return false;
                }
                if *locator == tab_bar_locator() || *locator == promoter_tab_locator() {
                    return true;
                }
                if *locator == promoter_marker_locator() {
                    return *promoter_tab && !spec.missing_detail.contains(&LABEL_COMPANY_NAME);
                }
                false
            }
        }
    }

    fn no_such_element(locator: &Locator) -> PageError {
        PageError::Action {
            locator: locator.clone(),
            reason: "no such element".to_string(),
        }
    }
}

impl PageSource for FakeSite {
    fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        if self.navigation_fails {
            return Err(PageError::Navigation {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.view = View::Listing(1);
        self.visited_pages.push(1);
        self.raise_overlay();
        Ok(())
    }

    fn current_markup(&mut self) -> Result<String, PageError> {
        let mut markup = match &self.view {
            View::Blank => "<html><body><div class=\"loader\"></div></body></html>".to_string(),
            View::Listing(p) => listing_html(&self.pages[p - 1], Some(*p), self.next_disabled(*p)),
            View::Detail {
                page,
                card,
                promoter_tab,
            } => {
                let spec = &self.pages[page - 1][*card];
                if spec.broken_detail {
                    "<html><body><div class=\"loader\"></div></body></html>".to_string()
                } else {
                    let key = spec.key.clone().unwrap_or_default();
                    detail_markup(&key, &spec.missing_detail, *promoter_tab)
                }
            }
        };
        if self.overlay_visible {
            markup = markup.replace(
                "</body>",
                "<div class=\"swal2-container\"><button class=\"swal2-confirm\">OK</button></div></body>",
            );
        }
        Ok(markup)
    }

    fn wait_for(
        &mut self,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> Result<(), PageError> {
        let present = self.present(locator);
        let holds = match condition {
            Condition::Present | Condition::Clickable => present,
            Condition::Absent => !present,
        };
        if holds {
            Ok(())
        } else {
            Err(PageError::Timeout {
                locator: locator.clone(),
                condition,
                waited: timeout,
            })
        }
    }

    fn invoke(&mut self, locator: &Locator) -> Result<(), PageError> {
        if *locator == confirm_locator() {
            if !self.overlay_visible {
                return Err(Self::no_such_element(locator));
            }
            if !self.stuck_overlay {
                self.overlay_visible = false;
                self.overlays_dismissed += 1;
            }
            return Ok(());
        }
        if self.overlay_visible {
            return Err(PageError::Action {
                locator: locator.clone(),
                reason: "click intercepted by overlay".to_string(),
            });
        }

        match self.view.clone() {
            View::Listing(p) if *locator == next_locator() => {
                if self.next_disabled(p) {
                    return Ok(());
                }
                if self.next_stalls_on == Some(p) {
                    self.view = View::Blank;
                } else {
                    self.view = View::Listing(p + 1);
                    self.visited_pages.push(p + 1);
                }
                self.raise_overlay();
                Ok(())
            }
            View::Listing(p) => {
                let cards = self.pages[p - 1].len();
                match (0..cards).find(|i| *locator == view_details_locator(*i)) {
                    Some(card) => {
                        self.view = View::Detail {
                            page: p,
                            card,
                            promoter_tab: false,
                        };
                        self.detail_views_opened += 1;
                        self.raise_overlay();
                        Ok(())
                    }
                    None => Err(Self::no_such_element(locator)),
                }
            }
            View::Detail { page, card, .. }
                if *locator == promoter_tab_locator() && self.present(locator) =>
            {
                self.view = View::Detail {
                    page,
                    card,
                    promoter_tab: true,
                };
                Ok(())
            }
            _ => Err(Self::no_such_element(locator)),
        }
    }

    fn back(&mut self) -> Result<(), PageError> {
        match self.view {
            View::Detail { page, .. } => {
                self.view = View::Listing(page);
                self.raise_overlay();
                Ok(())
            }
            _ => Err(PageError::Session("no history entry to go back to".to_string())),
        }
    }
}
