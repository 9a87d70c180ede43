use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("input size mismatch: expected {expected}, got {actual}")]
    InputSizeMismatch { expected: usize, actual: usize },

    #[error("missing value at input {index} is not allowed by this layer")]
    MissingValueNotAllowed { index: usize },

    #[error("insufficient scratch space: need {required} elements, got {provided}")]
    InsufficientScratchSpace { required: usize, provided: usize },

    #[error("parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("invalid data: {0}")]
    Format(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    #[inline]
    pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(Error::InputSizeMismatch { expected, actual });
        }
        Ok(())
    }
}
