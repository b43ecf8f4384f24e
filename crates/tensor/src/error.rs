use thiserror::Error;

/// Errors raised by tensor-op preconditions.
///
/// These are contract violations, not recoverable runtime conditions: a
/// caller that assembles shapes correctly never sees one. Callers inside
/// this workspace that construct their own operands `expect()` these; only
/// crates that forward externally-supplied shapes (none do, today) would
/// propagate them further.
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("rank must be 1..={max}, got {got}", max = crate::MAX_DIM)]
    InvalidRank { got: usize },
    #[error("axis {axis} out of range for rank-{rank} tensor")]
    AxisOutOfRange { axis: usize, rank: usize },
    #[error("index {index} out of range for axis {axis} (dim {dim})")]
    IndexOutOfRange {
        axis: usize,
        index: usize,
        dim: usize,
    },
    #[error("matmul requires rank-2 operands, got A rank {a_rank} and B rank {b_rank}")]
    MatmulRank { a_rank: usize, b_rank: usize },
    #[error("matmul requires contiguous row-major operands")]
    MatmulNonContiguous,
    #[error("matmul inner dimensions disagree: A is [.., {a_k}], B is [{b_k}, ..]")]
    MatmulInnerMismatch { a_k: usize, b_k: usize },
    #[error("batched matmul requires rank-3 operands, got A rank {a_rank} and B rank {b_rank}")]
    BmmRank { a_rank: usize, b_rank: usize },
    #[error("batched matmul requires equal batch dimensions, got {a_batch} and {b_batch}")]
    BmmBatchMismatch { a_batch: usize, b_batch: usize },
    #[error("binary op operands are incompatible: out shape {out:?}, other shape {other:?}")]
    IncompatibleBroadcast {
        out: Vec<usize>,
        other: Vec<usize>,
    },
    #[error("data length {got} does not match the product of dims {dims:?} ({expected})")]
    DataLengthMismatch {
        dims: Vec<usize>,
        expected: usize,
        got: usize,
    },
    #[error("io error during tensor (de)serialization: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt tensor stream: {0}")]
    Corrupt(String),
    #[error("operation requires a contiguous row-major tensor")]
    NotContiguous,
}

pub type Result<T> = std::result::Result<T, TensorError>;
