use std::time::Duration;

/// Configuration for the headless browser session.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub user_agent: Option<String>,
    /// Page-load and readiness-wait ceiling.
    pub timeout_seconds: u64,
    /// Skip image loading for faster renders.
    pub disable_images: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            timeout_seconds: 30,
            disable_images: true,
        }
    }
}

impl BrowserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_size, (1920, 1080));
        assert!(config.user_agent.is_some());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }
}
