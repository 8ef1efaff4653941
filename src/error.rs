use thiserror::Error;

/// Classification of a failed fetch, used by the retry policy and the
/// run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Request or page-load deadline exceeded.
    Timeout,
    /// Upstream answered with a non-success HTTP status.
    HttpStatus,
    /// Browser session failed to render the page.
    RenderFailure,
    /// Connection-level failure (DNS, reset, refused) or malformed URL.
    Network,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::HttpStatus => "http_status",
            FetchErrorKind::RenderFailure => "render_failure",
            FetchErrorKind::Network => "network",
        }
    }
}

/// Failure of a single fetch target after the retry budget is spent.
///
/// Always carries the target URL and how many attempts were actually made,
/// so the run report can distinguish "failed fast" from "retried out".
#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed after {attempts} attempt(s) ({}): {message}", kind.as_str())]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
    pub status: Option<u16>,
    pub attempts: usize,
    pub message: String,
}

impl FetchError {
    pub fn new(url: &str, kind: FetchErrorKind, attempts: usize, message: String) -> Self {
        Self {
            url: url.to_string(),
            kind,
            status: None,
            attempts,
            message,
        }
    }

    pub fn http_status(url: &str, status: u16, attempts: usize) -> Self {
        Self {
            url: url.to_string(),
            kind: FetchErrorKind::HttpStatus,
            status: Some(status),
            attempts,
            message: format!("HTTP status {}", status),
        }
    }
}

/// Structural extraction failure.
///
/// Missing optional fields never raise this; it fires only when a page's
/// required anchor elements are absent, which usually means the upstream
/// markup changed shape.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("structure mismatch on {url}: {detail}")]
    StructureMismatch { url: String, detail: String },
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::StructureMismatch { .. } => "structure_mismatch",
        }
    }
}

/// Run-level failures. Per-page errors are degraded into report entries and
/// never surface here; the run as a whole only fails when nothing at all
/// could be extracted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no data extracted: all {attempted} fetch target(s) failed")]
    NoDataExtracted { attempted: usize },

    #[error("no valid entry points: {reason}")]
    NoEntryPoints { reason: String },
}
