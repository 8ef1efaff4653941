// Library interface for vlr_scraper
// This allows tests and external crates to use the extraction components

pub mod browser;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod output;
pub mod parsers;
pub mod pipeline;
pub mod rate_limit;

pub use config::{Config, OutputFormat, RunConfig};
pub use error::{FetchError, FetchErrorKind, ParseError, PipelineError};
pub use models::{CanonicalRecord, FetchTarget, PageType, RenderMode, RunReport};
pub use pipeline::{Pipeline, RunOutcome};
