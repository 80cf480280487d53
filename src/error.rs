use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {message}")]
    Read { path: String, message: String },
    #[error("invalid config line {line}: {content}")]
    InvalidLine { line: usize, content: String },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not prepare database location {path}: {message}")]
    Location { path: String, message: String },
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
    #[error("event not found: {0}")]
    NotFound(String),
    #[error("invalid persisted event data: {0}")]
    InvalidData(String),
    #[error("{0} is outside the storable range")]
    OutOfRange(&'static str),
    #[error("database task failed: {0}")]
    Task(String),
}

/// Failure talking to a completion backend. Never shown verbatim to end users.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is not configured: {message}")]
    NotConfigured { provider: &'static str, message: String },
    #[error("request to {provider} failed: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("{provider} did not answer within {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },
    #[error("{provider} returned status {status}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("could not decode {provider} response: {message}")]
    Decode { provider: &'static str, message: String },
    #[error("{provider} response had no message content")]
    MissingContent { provider: &'static str },
}

/// The model answered, but not with a usable `{ "actions": [...] }` envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpretationError {
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("model output is not a JSON object")]
    NotAnObject,
    #[error("model output has no `actions` array")]
    MissingActions,
}

#[derive(Debug, Error)]
pub enum AiCreateError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Interpretation(#[from] InterpretationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
