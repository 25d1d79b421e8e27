/// Core error type for the relay.
///
/// Adapter crates map their transport errors into this type so the registry and
/// broadcast engine can report failures consistently (operator-facing message vs
/// per-destination delivery failure).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Operator-facing detail: the underlying message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::External(s) | Error::Config(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
