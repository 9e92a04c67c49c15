use std::thread;
use std::time::Duration;

use log::debug;

/// Fixed pause after a UI action, letting the registry's scripts re-render.
pub fn settle(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    debug!("Waiting {} ms for the page to settle...", delay.as_millis());
    thread::sleep(delay);
}
