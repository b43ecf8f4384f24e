use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to read vocabulary file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("vocabulary has no \"##\" continuation subtree (no token begins with ##)")]
    MissingContinuationSubtree,
    #[error("no vocabulary entry matches \"{0}\" (or its ## continuation)")]
    UnknownSubword(String),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
