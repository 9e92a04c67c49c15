use log::{debug, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractionError;
use crate::record::{Candidate, PromoterDetails};

/// Exact class attribute of a listing card on the registry.
pub const CARD_CLASS: &str = "card project-card mb-3";

pub const LABEL_COMPANY_NAME: &str = "Company Name";
pub const LABEL_REGISTRATION_NO: &str = "Registration No.";
pub const LABEL_CORRESPONDENCE_ADDRESS: &str = "Correspondence Office Address";
pub const LABEL_REGISTERED_ADDRESS: &str = "Registered Office Address";
pub const LABEL_ENTITY: &str = "Entity";
pub const LABEL_EMAIL: &str = "Email Id";
pub const LABEL_MOBILE: &str = "Mobile";
pub const LABEL_TELEPHONE: &str = "Telephone No.";
pub const LABEL_GST_NO: &str = "GST No.";

/// Outcome of parsing one listing page.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub candidates: Vec<Candidate>,
    /// Cards that could not be parsed, by position.
    pub failures: Vec<(usize, ExtractionError)>,
}

impl ListingPage {
    pub fn card_count(&self) -> usize {
        self.candidates.len() + self.failures.len()
    }
}

/// Label text -> value-or-absent, over a fixed piece of markup.
///
/// A label matches when its collapsed text equals the requested label exactly. The value is the
/// next sibling element with the value tag; failing that, the next such element in document order
/// before the next label. A label with no value of its own is absent, never its neighbour's.
pub struct FieldLocator<'a> {
    root: ElementRef<'a>,
    labels: &'a Selector,
    value_tag: &'a str,
}

impl<'a> FieldLocator<'a> {
    pub fn new(root: ElementRef<'a>, labels: &'a Selector, value_tag: &'a str) -> Self {
        FieldLocator {
            root,
            labels,
            value_tag,
        }
    }

    pub fn value(&self, label: &str) -> Option<String> {
        for node in self.root.select(self.labels) {
            if collapse(&node.text().collect::<String>()) != label {
                continue;
            }

            let sibling = node
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|e| e.value().name() == self.value_tag);
            if let Some(v) = sibling {
                return non_empty(element_text(v));
            }

            let mut after = false;
            for e in self.root.descendants().filter_map(ElementRef::wrap) {
                if e.id() == node.id() {
                    after = true;
                    continue;
                }
                if !after || e.ancestors().any(|a| a.id() == node.id()) {
                    continue;
                }
                if self.labels.matches(&e) {
                    break;
                }
                if e.value().name() == self.value_tag {
                    return non_empty(element_text(e));
                }
            }
        }
        None
    }
}

pub struct Extractor {
    card_selector: Selector,
    title_selector: Selector,
    byline_selector: Selector,
    key_selector: Selector,
    label_selector: Selector,
    byline_prefix: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            card_selector: Selector::parse(&format!("div[class=\"{}\"]", CARD_CLASS))
                .expect("card selector"),
            title_selector: Selector::parse("h5.card-title").expect("title selector"),
            byline_selector: Selector::parse("small").expect("byline selector"),
            key_selector: Selector::parse("span.fw-bold").expect("key selector"),
            label_selector: Selector::parse("label").expect("label selector"),
            byline_prefix: Regex::new(r"(?i)^by\s+").expect("byline regex"),
        }
    }

    /// Parse every card on a listing page. A bad card is logged and skipped; it never
    /// aborts the page.
    pub fn parse_listing(&self, markup: &str) -> ListingPage {
        let document = Html::parse_document(markup);
        let mut page = ListingPage::default();

        for (position, card) in document.select(&self.card_selector).enumerate() {
            match self.parse_card(position, card) {
                Ok(candidate) => page.candidates.push(candidate),
                Err(e) => {
                    warn!("Failed to parse card {}: {}", position + 1, e);
                    page.failures.push((position, e));
                }
            }
        }

        debug!(
            "Parsed {} cards: {} candidates, {} failures",
            page.card_count(),
            page.candidates.len(),
            page.failures.len()
        );
        page
    }

    /// Registration number carried by the card at `position`, if that card exists.
    pub fn key_at(&self, markup: &str, position: usize) -> Option<String> {
        let document = Html::parse_document(markup);
        let card = document.select(&self.card_selector).nth(position)?;
        self.first_text(card, &self.key_selector)
    }

    fn parse_card(&self, position: usize, card: ElementRef<'_>) -> Result<Candidate, ExtractionError> {
        let context = format!("card {}", position + 1);

        let name = self
            .first_text(card, &self.title_selector)
            .ok_or_else(|| ExtractionError::new("title", &context))?;
        let byline = self
            .first_text(card, &self.byline_selector)
            .ok_or_else(|| ExtractionError::new("promoter byline", &context))?;
        let promoter_name = self.byline_prefix.replace(&byline, "").trim().to_string();
        if promoter_name.is_empty() {
            return Err(ExtractionError::new("promoter name", &context));
        }
        let natural_key = self
            .first_text(card, &self.key_selector)
            .ok_or_else(|| ExtractionError::new("registration number", &context))?;

        let address = FieldLocator::new(card, &self.label_selector, "strong").value("Address");
        if address.is_none() {
            warn!("Card {} ({}) has no address", position + 1, name);
        }

        Ok(Candidate {
            position,
            name,
            natural_key,
            promoter_name,
            address,
        })
    }

    /// Read the promoter section of a detail view. Missing fields are left absent.
    pub fn parse_promoter_details(&self, markup: &str) -> PromoterDetails {
        let document = Html::parse_document(markup);
        let fields = FieldLocator::new(document.root_element(), &self.label_selector, "strong");
        let read = |label: &str| {
            let value = fields.value(label);
            if value.is_none() {
                warn!("Promoter field '{}' not found", label);
            }
            value
        };

        PromoterDetails {
            company_name: read(LABEL_COMPANY_NAME),
            registration_no: read(LABEL_REGISTRATION_NO),
            correspondence_office_address: read(LABEL_CORRESPONDENCE_ADDRESS),
            registered_office_address: read(LABEL_REGISTERED_ADDRESS),
            entity_type: read(LABEL_ENTITY),
            email: read(LABEL_EMAIL),
            mobile: read(LABEL_MOBILE),
            telephone: read(LABEL_TELEPHONE),
            gst_no: read(LABEL_GST_NO),
        }
    }

    fn first_text(&self, scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
        scope
            .select(selector)
            .next()
            .and_then(|e| non_empty(element_text(e)))
    }
}

fn element_text(e: ElementRef<'_>) -> String {
    collapse(&e.text().collect::<String>())
}

/// Trim and squeeze internal runs of whitespace to single spaces.
pub fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
