//! Chrome driven over WebDriver.
//!
//! The harvest is one blocking flow, so the async WebDriver client runs on a private
//! current-thread runtime owned by the session and every call is driven to completion
//! before returning.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator as WdLocator};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use tokio::runtime::{Builder, Runtime};

use crate::config::AppConfig;
use crate::error::PageError;
use crate::page_source::{Condition, Locator, PageSource};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DRIVER_STARTUP: Duration = Duration::from_secs(10);

pub struct ChromeSession {
    runtime: Runtime,
    client: Option<Client>,
    driver: Option<Child>,
    page_load_timeout: Duration,
}

impl ChromeSession {
    /// Start chromedriver and open a headless Chrome session through it.
    pub fn launch(config: &AppConfig) -> Result<Self, PageError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PageError::Session(format!("could not start runtime: {}", e)))?;

        info!("Starting chromedriver {:?} on port {}", config.chromedriver, config.chromedriver_port);
        let mut driver = Command::new(&config.chromedriver)
            .arg(format!("--port={}", config.chromedriver_port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PageError::Session(format!("could not start {:?}: {}", config.chromedriver, e))
            })?;

        let mut capabilities = Map::new();
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "binary": config.chrome_binary.to_string_lossy(),
                "args": ["--headless", "--no-sandbox", "--disable-dev-shm-usage"],
            }),
        );
        let webdriver_url = format!("http://localhost:{}", config.chromedriver_port);

        match runtime.block_on(connect(&webdriver_url, capabilities)) {
            Ok(client) => {
                info!("Browser session ready");
                Ok(ChromeSession {
                    runtime,
                    client: Some(client),
                    driver: Some(driver),
                    page_load_timeout: config.timeouts.page_load,
                })
            }
            Err(e) => {
                let _ = driver.kill();
                let _ = driver.wait();
                Err(e)
            }
        }
    }

    fn client(&self) -> Result<&Client, PageError> {
        self.client
            .as_ref()
            .ok_or_else(|| PageError::Session("session already closed".to_string()))
    }
}

async fn connect(url: &str, capabilities: Map<String, Value>) -> Result<Client, PageError> {
    let deadline = Instant::now() + DRIVER_STARTUP;
    loop {
        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities.clone());
        match builder.connect(url).await {
            Ok(client) => return Ok(client),
            Err(e) if Instant::now() < deadline => {
                debug!("chromedriver not ready yet: {}", e);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(e) => {
                return Err(PageError::Session(format!(
                    "could not connect to chromedriver at {}: {}",
                    url, e
                )))
            }
        }
    }
}

/// Go to `url` and poll until the document reports itself complete.
async fn load(client: &Client, url: &str) -> Result<(), String> {
    client.goto(url).await.map_err(|e| e.to_string())?;
    loop {
        let state = client
            .execute("return document.readyState", vec![])
            .await
            .map_err(|e| e.to_string())?;
        if state.as_str() == Some("complete") {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn wd(locator: &Locator) -> WdLocator<'_> {
    match locator {
        Locator::Css(s) => WdLocator::Css(s),
        Locator::XPath(s) => WdLocator::XPath(s),
        Locator::LinkText(s) => WdLocator::LinkText(s),
    }
}

async fn condition_holds(client: &Client, locator: &Locator, condition: Condition) -> bool {
    let elements = match client.find_all(wd(locator)).await {
        Ok(elements) => elements,
        Err(e) => {
            debug!("Lookup of {} failed: {}", locator, e);
            return false;
        }
    };

    match condition {
        Condition::Present => !elements.is_empty(),
        Condition::Clickable => match elements.first() {
            Some(el) => {
                el.is_displayed().await.unwrap_or(false) && el.is_enabled().await.unwrap_or(false)
            }
            None => false,
        },
        Condition::Absent => {
            for el in &elements {
                if el.is_displayed().await.unwrap_or(false) {
                    return false;
                }
            }
            true
        }
    }
}

impl PageSource for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        let client = self.client()?;
        let timeout = self.page_load_timeout;
        debug!("Navigating to {}", url);

        let loaded = self.runtime.block_on(async {
            tokio::time::timeout(timeout, load(client, url))
                .await
                .unwrap_or_else(|_| Err(format!("not interactive within {:?}", timeout)))
        });

        loaded.map_err(|reason| PageError::Navigation {
            url: url.to_string(),
            reason,
        })
    }

    fn current_markup(&mut self) -> Result<String, PageError> {
        let client = self.client()?;
        self.runtime
            .block_on(client.source())
            .map_err(|e| PageError::Session(format!("could not read page source: {}", e)))
    }

    fn wait_for(
        &mut self,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> Result<(), PageError> {
        let client = self.client()?;
        if condition == Condition::Present {
            return match self.runtime.block_on(
                client
                    .wait()
                    .at_most(timeout)
                    .every(POLL_INTERVAL)
                    .for_element(wd(locator)),
            ) {
                Ok(_) => Ok(()),
                Err(CmdError::WaitTimeout) => Err(PageError::Timeout {
                    locator: locator.clone(),
                    condition,
                    waited: timeout,
                }),
                Err(e) => Err(PageError::Session(format!("waiting for {} failed: {}", locator, e))),
            };
        }

        // Visibility and enabled state need more than a lookup, so these poll by hand.
        let held = self.runtime.block_on(async {
            let deadline = Instant::now() + timeout;
            loop {
                if condition_holds(client, locator, condition).await {
                    return true;
                }
                if Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });

        if held {
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
        let client = self.client()?;
        self.runtime
            .block_on(async {
                let element = client.find(wd(locator)).await.map_err(|e| e.to_string())?;
                let arg = serde_json::to_value(&element).map_err(|e| e.to_string())?;
                client
                    .execute("arguments[0].click();", vec![arg])
                    .await
                    .map_err(|e| e.to_string())?;
                Ok::<(), String>(())
            })
            .map_err(|reason| PageError::Action {
                locator: locator.clone(),
                reason,
            })
    }

    fn back(&mut self) -> Result<(), PageError> {
        let client = self.client()?;
        self.runtime
            .block_on(client.back())
            .map_err(|e| PageError::Session(format!("could not go back: {}", e)))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = self.runtime.block_on(client.close()) {
                warn!("Failed to close browser session: {}", e);
            }
        }
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.kill() {
                warn!("Failed to stop chromedriver: {}", e);
            }
            let _ = driver.wait();
        }
        info!("Browser session closed");
    }
}
