//! Browser-mode rendering for client-rendered pages.
//!
//! Match detail pages build their stats tables with JavaScript, so plain
//! HTTP fetches see empty shells. This module owns a reusable headless
//! Chrome session: launch, readiness waits, health checks, and restart
//! after a crash. Callers only ever see rendered HTML or a [`BrowserError`].

pub mod config;
pub mod session;

pub use config::BrowserConfig;
pub use session::{BrowserError, BrowserSession, Readiness};
