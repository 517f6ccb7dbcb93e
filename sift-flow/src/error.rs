use thiserror::Error;

/// Everything that can go wrong before the solver starts.
///
/// Once inputs are validated the pipeline always runs to completion, so none
/// of these variants can be produced half-way through a flow computation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "input dimension mismatch: {}x{} vs {}x{}",
        .first.0, .first.1, .second.0, .second.1
    )]
    InputDimensionMismatch {
        /// `(width, height)` of the first input.
        first: (usize, usize),
        /// `(width, height)` of the second input.
        second: (usize, usize),
    },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("image has no pixels")]
    EmptyImage,
    #[error("raw buffer holds {actual} values but {expected} were expected")]
    BufferSize { expected: usize, actual: usize },
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
