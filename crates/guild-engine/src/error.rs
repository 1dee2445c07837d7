//! Error types for the guild engine binary.

/// Top-level error for the guild engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: guild_cache::ConfigError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// A message could not be encoded or decoded.
    #[error("codec error: {source}")]
    Codec {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
