use thiserror::Error;

/// Errors raised while opening or querying a TBF1 weight container.
#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("failed to open weight file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read weight file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad magic in {path}: expected \"TBF1\", got {got:?}")]
    BadMagic { path: String, got: [u8; 4] },
    #[error("header for tensor #{index} in {path} is truncated or malformed: {detail}")]
    MalformedHeader {
        path: String,
        index: u64,
        detail: String,
    },
    #[error("tensor name at #{index} in {path} is not valid UTF-8")]
    InvalidName { path: String, index: u64 },
    #[error("tensor \"{name}\" has dtype {dtype} but was requested as f32")]
    WrongDtype { name: String, dtype: u8 },
    #[error("no tensor named \"{0}\" in the weight container")]
    MissingTensor(String),
    #[error(transparent)]
    Tensor(#[from] tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, WeightsError>;
