//! Crate error type.

/// Errors surfaced by policy construction, configuration, and the external
/// collaborators the engine calls into.
///
/// Evaluation itself never returns these: checker and parser failures are
/// converted into decisions inside [`PolicyEngine::check`](crate::eval::PolicyEngine::check).
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid args pattern `{pattern}`: {source}")]
    InvalidArgsPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("shell parser initialization failed: {0}")]
    ShellParser(String),

    #[error("checker `{checker}` failed: {message}")]
    Checker { checker: String, message: String },

    #[error("unknown checker: {0}")]
    UnknownChecker(String),

    #[error("policy service is no longer running")]
    ServiceClosed,
}

pub type Result<T> = std::result::Result<T, PolicyError>;
