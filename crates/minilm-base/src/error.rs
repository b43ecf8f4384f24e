use thiserror::Error;

/// Errors shared by every crate above `weights`/`tokenizer`: opening a model
/// (bad files), tokenizing (unknown subwords, too many tokens), and running
/// a tensor op whose precondition this crate itself failed to satisfy (a
/// programming error, not a recoverable runtime condition — see the
/// `Tensor` variant's doc).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Weights(#[from] weights::WeightsError),
    #[error(transparent)]
    Tokenizer(#[from] tokenizer::TokenizerError),
    #[error("input tokenizes to {actual} tokens, exceeding the {max}-token limit")]
    TokenLimitExceeded { actual: usize, max: usize },
    #[error("internal tensor-shape error: {0}")]
    Tensor(#[from] tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
