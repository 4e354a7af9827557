/// Failures talking to the oilcast API or decoding its progress stream.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Missing or invalid configuration: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status and a `{error, code}` body.
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Malformed '{event}' frame: {source}")]
    MalformedFrame {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Progress stream failed: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
