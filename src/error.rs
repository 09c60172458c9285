use thiserror::Error;

/// Failure taxonomy for a scrape run. The split that matters operationally is
/// transient vs permanent: transient failures are retried with backoff,
/// permanent ones propagate immediately.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Target page unreachable, connection reset, or timed out.
    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// The server answered but with a retryable status (429, 5xx).
    #[error("server returned {status} for {url}")]
    ServerBusy { url: String, status: u16 },

    /// The page definitively does not exist (404, or a 404-titled body).
    #[error("page not found: {url}")]
    NotFound { url: String },

    /// Every locator in an intent's fallback chain was tried and none
    /// produced an interactable match.
    #[error("no locator matched for intent '{intent}'")]
    LocatorNotFound { intent: &'static str },

    /// A candidate value failed its shape/content predicate. Local and
    /// silent: the caller discards the candidate and tries the next locator.
    #[error("candidate for field '{field}' failed validation")]
    Validation { field: &'static str },

    /// Store write failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Transient errors are worth retrying; permanent ones are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::Navigation { .. } | ScrapeError::ServerBusy { .. }
        )
    }
}

/// Returned when a retried operation exhausts its attempt budget: carries the
/// attempt count and the last underlying cause.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub last: ScrapeError,
}
