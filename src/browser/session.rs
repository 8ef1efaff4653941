use super::config::BrowserConfig;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Errors from the rendering session.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser configuration error: {0}")]
    Configuration(String),

    #[error("tab creation failed: {0}")]
    TabCreation(String),

    #[error("navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("HTML extraction failed: {0}")]
    HtmlExtraction(String),
}

impl BrowserError {
    /// True for failures the fetcher should treat as a dead session and
    /// answer by relaunching the browser.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, BrowserError::Launch(_) | BrowserError::TabCreation(_))
    }
}

/// When a rendered page is considered ready for HTML extraction.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// An element matching this CSS selector is present.
    Selector(String),
    /// A fixed settle delay after navigation.
    Settle(Duration),
}

/// A reusable headless Chrome session.
///
/// One session serves many renders; each render gets its own tab. The
/// fetcher health-checks the session between renders and relaunches it
/// when Chrome has died.
pub struct BrowserSession {
    browser: Browser,
    config: BrowserConfig,
}

impl BrowserSession {
    pub fn launch(config: BrowserConfig) -> Result<Self, BrowserError> {
        // Owned strings first; LaunchOptions borrows them as &OsStr.
        let images_arg = config
            .disable_images
            .then(|| "--blink-settings=imagesEnabled=false".to_string());
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--no-sandbox"),
        ];
        if let Some(ref img) = images_arg {
            args.push(OsStr::new(img));
        }
        if let Some(ref ua) = user_agent_arg {
            args.push(OsStr::new(ua));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(config.window_size))
            .args(args)
            .build()
            .map_err(|e| BrowserError::Configuration(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;

        log::info!("browser session launched (headless: {})", config.headless);
        Ok(Self { browser, config })
    }

    /// Cheap liveness probe; false means the Chrome process is gone and the
    /// session must be relaunched.
    pub fn is_healthy(&self) -> bool {
        self.browser.get_version().is_ok()
    }

    fn new_tab(&self) -> Result<Arc<Tab>, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::TabCreation(e.to_string()))?;

        // Hide the automation markers sites probe for.
        let stealth_script = r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
        "#;
        let _ = tab.evaluate(stealth_script, false);

        Ok(tab)
    }

    /// Navigate to `url`, wait for the readiness condition, and return the
    /// rendered HTML.
    pub fn render(&self, url: &str, readiness: &Readiness) -> Result<String, BrowserError> {
        log::debug!("rendering {}", url);
        let tab = self.new_tab()?;

        tab.navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(|e| classify_navigation_error(url, e.to_string()))?;

        match readiness {
            Readiness::Selector(css) => {
                tab.wait_for_element_with_custom_timeout(css, self.config.timeout())
                    .map_err(|_| BrowserError::Timeout(format!("selector {}", css)))?;
                // Brief settle so late table rows land in the DOM.
                std::thread::sleep(Duration::from_millis(500));
            }
            Readiness::Settle(delay) => {
                std::thread::sleep(*delay);
            }
        }

        let html = tab
            .get_content()
            .map_err(|e| BrowserError::HtmlExtraction(e.to_string()))?;

        Ok(html)
    }
}

fn classify_navigation_error(url: &str, message: String) -> BrowserError {
    if message.to_lowercase().contains("timed out") || message.to_lowercase().contains("timeout") {
        BrowserError::Timeout(format!("navigation to {}", url))
    } else {
        BrowserError::Navigation {
            url: url.to_string(),
            message,
        }
    }
}
