use std::time::Duration;

use log::{debug, info, warn};

use crate::page_source::{Condition, Locator, PageSource};

/// Confirmation button of the registry's modal alert.
pub fn confirm_locator() -> Locator {
    Locator::css("button.swal2-confirm")
}

pub fn overlay_locator() -> Locator {
    Locator::css("div.swal2-container")
}

/// Dismisses transient modal overlays. Never fails the caller.
#[derive(Debug, Clone)]
pub struct OverlayGuard {
    timeout: Duration,
}

impl OverlayGuard {
    pub fn new(timeout: Duration) -> Self {
        OverlayGuard { timeout }
    }

    /// Returns `true` only when an overlay was found, confirmed, and went away.
    pub fn dismiss_if_present(&self, page: &mut dyn PageSource) -> bool {
        let confirm = confirm_locator();
        if let Err(e) = page.wait_for(&confirm, Condition::Clickable, self.timeout) {
            if !e.is_timeout() {
                debug!("Overlay probe failed: {}", e);
            }
            return false;
        }

        if let Err(e) = page.invoke(&confirm) {
            warn!("Could not confirm overlay: {}", e);
            return false;
        }

        match page.wait_for(&overlay_locator(), Condition::Absent, self.timeout) {
            Ok(()) => {
                info!("Dismissed overlay");
                true
            }
            Err(e) => {
                warn!("Overlay still visible after confirm: {}", e);
                false
            }
        }
    }
}
