//! Drill-down from a listing card into its detail view.
//!
//! Candidates are addressed by their card position on the live page, never by a handle
//! from an earlier read. The position is re-checked against the candidate's registration
//! number before anything is clicked.

use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{DrillDownError, PageError};
use crate::extractor::{Extractor, CARD_CLASS, LABEL_COMPANY_NAME};
use crate::overlay::OverlayGuard;
use crate::page_source::{Condition, Locator, PageSource};
use crate::pagination::card_locator;
use crate::record::{Candidate, PromoterDetails};

pub fn view_details_locator(position: usize) -> Locator {
    Locator::xpath(format!(
        "(//div[@class='{}'])[{}]//a[contains(normalize-space(.), 'View Details')]",
        CARD_CLASS,
        position + 1
    ))
}

pub fn tab_bar_locator() -> Locator {
    Locator::css("ul.nav-tabs")
}

pub fn promoter_tab_locator() -> Locator {
    Locator::link_text("Promoter Details")
}

/// Rendered once the promoter section has loaded.
pub fn promoter_marker_locator() -> Locator {
    Locator::xpath(format!("//label[normalize-space(.)='{}']", LABEL_COMPANY_NAME))
}

pub struct DetailDrillDown<'a> {
    extractor: &'a Extractor,
    overlay: &'a OverlayGuard,
    timeout: Duration,
}

impl<'a> DetailDrillDown<'a> {
    pub fn new(extractor: &'a Extractor, overlay: &'a OverlayGuard, timeout: Duration) -> Self {
        DetailDrillDown {
            extractor,
            overlay,
            timeout,
        }
    }

    /// Open the candidate's detail view, read the promoter tab, and go back to the listing.
    ///
    /// Returning to the listing is best-effort; the caller re-validates its position
    /// afterwards either way.
    pub fn drill(
        &self,
        page: &mut dyn PageSource,
        candidate: &Candidate,
    ) -> Result<PromoterDetails, DrillDownError> {
        debug!("Drilling into '{}' at card {}", candidate.name, candidate.position + 1);
        self.open_detail(page, candidate)?;

        let details = self.read_promoter_tab(page, candidate);
        self.return_to_listing(page);
        details
    }

    fn open_detail(&self, page: &mut dyn PageSource, candidate: &Candidate) -> Result<(), DrillDownError> {
        let tag = |e: PageError| DrillDownError::page(&candidate.name, e);

        let view = view_details_locator(candidate.position);
        self.overlay.dismiss_if_present(page);
        page.wait_for(&view, Condition::Clickable, self.timeout)
            .map_err(tag)?;

        // Checked last so nothing runs between the check and the click.
        let markup = page.current_markup().map_err(tag)?;
        let found = self.extractor.key_at(&markup, candidate.position);
        if found.as_deref() != Some(candidate.natural_key.as_str()) {
            return Err(DrillDownError::KeyMismatch {
                name: candidate.name.clone(),
                position: candidate.position,
                expected: candidate.natural_key.clone(),
                found,
            });
        }
        page.invoke(&view).map_err(tag)?;

        self.overlay.dismiss_if_present(page);
        if let Err(e) = page.wait_for(&tab_bar_locator(), Condition::Present, self.timeout) {
            // We may have left the listing already.
            self.return_to_listing(page);
            return Err(tag(e));
        }
        Ok(())
    }

    fn read_promoter_tab(
        &self,
        page: &mut dyn PageSource,
        candidate: &Candidate,
    ) -> Result<PromoterDetails, DrillDownError> {
        let tag = |e: PageError| DrillDownError::page(&candidate.name, e);

        self.overlay.dismiss_if_present(page);
        page.invoke(&promoter_tab_locator()).map_err(tag)?;
        page.wait_for(&promoter_marker_locator(), Condition::Present, self.timeout)
            .map_err(tag)?;

        let markup = page.current_markup().map_err(tag)?;
        let details = self.extractor.parse_promoter_details(&markup);
        info!(
            "Read {}/9 promoter fields for '{}'",
            details.populated(),
            candidate.name
        );
        Ok(details)
    }

    fn return_to_listing(&self, page: &mut dyn PageSource) {
        if let Err(e) = page.back() {
            warn!("Could not go back to the listing: {}", e);
            return;
        }
        self.overlay.dismiss_if_present(page);
        if let Err(e) = page.wait_for(&card_locator(), Condition::Present, self.timeout) {
            warn!("Listing did not re-render after going back: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::LABEL_GST_NO;
    use crate::testing::{CardSpec, FakeSite, BASE_URL};

    fn listing(site: &mut FakeSite) -> Vec<Candidate> {
        site.navigate(BASE_URL).unwrap();
        Extractor::new()
            .parse_listing(&site.current_markup().unwrap())
            .candidates
    }

    #[test]
    fn test_drill_reads_all_fields_and_returns() {
        let mut site = FakeSite::new(vec![vec![
            CardSpec::new("A", "RP/A"),
            CardSpec::new("B", "RP/B"),
        ]]);
        let candidates = listing(&mut site);
        let extractor = Extractor::new();
        let overlay = OverlayGuard::new(Duration::ZERO);
        let drill = DetailDrillDown::new(&extractor, &overlay, Duration::ZERO);

        let details = drill.drill(&mut site, &candidates[1]).unwrap();
        assert_eq!(details.populated(), 9);
        assert_eq!(details.company_name.as_deref(), Some("Company of RP/B"));
        assert_eq!(site.current_listing_page(), Some(1));
    }

    #[test]
    fn test_missing_gst_is_absent() {
        let mut site = FakeSite::new(vec![vec![
            CardSpec::new("A", "RP/A").missing_detail(LABEL_GST_NO)
        ]]);
        let candidates = listing(&mut site);
        let extractor = Extractor::new();
        let overlay = OverlayGuard::new(Duration::ZERO);
        let drill = DetailDrillDown::new(&extractor, &overlay, Duration::ZERO);

        let details = drill.drill(&mut site, &candidates[0]).unwrap();
        assert_eq!(details.gst_no, None);
        assert_eq!(details.populated(), 8);
    }

    #[test]
    fn test_broken_detail_fails_candidate_and_returns() {
        let mut site = FakeSite::new(vec![vec![CardSpec::new("A", "RP/A").broken_detail()]]);
        let candidates = listing(&mut site);
        let extractor = Extractor::new();
        let overlay = OverlayGuard::new(Duration::ZERO);
        let drill = DetailDrillDown::new(&extractor, &overlay, Duration::ZERO);

        let err = drill.drill(&mut site, &candidates[0]).unwrap_err();
        assert!(matches!(err, DrillDownError::Page { ref name, .. } if name == "A"));
        assert_eq!(site.current_listing_page(), Some(1));
    }

    #[test]
    fn test_shifted_listing_is_a_key_mismatch() {
        let mut site = FakeSite::new(vec![vec![
            CardSpec::new("A", "RP/A"),
            CardSpec::new("B", "RP/B"),
        ]]);
        let candidates = listing(&mut site);
        site.replace_page(1, vec![CardSpec::new("C", "RP/C"), CardSpec::new("A", "RP/A")]);

        let extractor = Extractor::new();
        let overlay = OverlayGuard::new(Duration::ZERO);
        let drill = DetailDrillDown::new(&extractor, &overlay, Duration::ZERO);

        let err = drill.drill(&mut site, &candidates[1]).unwrap_err();
        match err {
            DrillDownError::KeyMismatch { expected, found, .. } => {
                assert_eq!(expected, "RP/B");
                assert_eq!(found.as_deref(), Some("RP/A"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(site.detail_views_opened, 0);
    }

    #[test]
    fn test_listing_shifting_while_overlay_is_dismissed_is_caught() {
        // The listing re-renders with a new first card as the overlay is confirmed.
        struct ShiftOnConfirm(FakeSite);

        impl PageSource for ShiftOnConfirm {
            fn navigate(&mut self, url: &str) -> Result<(), PageError> {
                self.0.navigate(url)
            }
            fn current_markup(&mut self) -> Result<String, PageError> {
                self.0.current_markup()
            }
            fn wait_for(&mut self, locator: &Locator, condition: Condition, timeout: Duration) -> Result<(), PageError> {
                self.0.wait_for(locator, condition, timeout)
            }
            fn invoke(&mut self, locator: &Locator) -> Result<(), PageError> {
                self.0.invoke(locator)?;
                if *locator == crate::overlay::confirm_locator() {
                    self.0.replace_page(
                        1,
                        vec![CardSpec::new("New", "RP/NEW"), CardSpec::new("A", "RP/A")],
                    );
                }
                Ok(())
            }
            fn back(&mut self) -> Result<(), PageError> {
                self.0.back()
            }
        }

        let mut site = ShiftOnConfirm(
            FakeSite::new(vec![vec![CardSpec::new("A", "RP/A")]]).with_overlays(),
        );
        site.navigate(BASE_URL).unwrap();
        let candidates = Extractor::new()
            .parse_listing(&site.current_markup().unwrap())
            .candidates;

        let extractor = Extractor::new();
        let overlay = OverlayGuard::new(Duration::ZERO);
        let drill = DetailDrillDown::new(&extractor, &overlay, Duration::ZERO);

        let err = drill.drill(&mut site, &candidates[0]).unwrap_err();
        assert!(matches!(err, DrillDownError::KeyMismatch { ref found, .. } if found.as_deref() == Some("RP/NEW")));
        assert_eq!(site.0.detail_views_opened, 0);
    }

    #[test]
    fn test_overlay_on_detail_is_dismissed() {
        let mut site = FakeSite::new(vec![vec![CardSpec::new("A", "RP/A")]]).with_overlays();
        let candidates = listing(&mut site);
        let extractor = Extractor::new();
        let overlay = OverlayGuard::new(Duration::ZERO);
        overlay.dismiss_if_present(&mut site);
        let drill = DetailDrillDown::new(&extractor, &overlay, Duration::ZERO);

        let details = drill.drill(&mut site, &candidates[0]).unwrap();
        assert_eq!(details.populated(), 9);
        // listing load, detail view, return to listing
        assert_eq!(site.overlays_dismissed, 3);
    }
}
