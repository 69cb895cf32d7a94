use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("reading from {url} failed: {message}")]
    Read { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<HarvestError>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("store error: {0}")]
    Store(#[from] paperscope_core::PaperscopeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("candidate #{0} has no id, detail URL or title")]
    MissingIdentity(usize),
}

impl HarvestError {
    /// Failures worth retrying or worth retrying on a later run: network
    /// trouble and server-side errors. Store failures are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Read { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Exhausted { last, .. } => last.is_transient(),
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_body(),
            _ => false,
        }
    }

    /// Whether this error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
