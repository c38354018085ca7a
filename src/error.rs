use thiserror::Error;

/// Failure talking to the search API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("malformed search response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Rate limits, server errors and connection trouble are worth retrying;
    /// a body we cannot read or a 4xx we did not expect is not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("record has no external id")]
    MissingId,
}

/// Failure talking to the generation API.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API key configured for the generation service")]
    MissingApiKey,
    #[error("generation API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("generation timed out")]
    Timeout,
    #[error("generation API returned no content")]
    EmptyResponse,
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Network(_) | GenerationError::Timeout => true,
            GenerationError::MissingApiKey | GenerationError::EmptyResponse => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("an import is already running")]
    AlreadyRunning,
    #[error("invalid import options: {0}")]
    InvalidOptions(String),
    #[error("fetching page {page} failed: {source}")]
    Fetch {
        page: u32,
        #[source]
        source: FetchError,
    },
    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),
    #[error("import task aborted: {0}")]
    Aborted(String),
}
