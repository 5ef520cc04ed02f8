use crate::compile::diagnostics::Diagnostics;

pub type WavepatchResult<T> = Result<T, WavepatchError>;

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum WavepatchError {
    /// A malformed patch, or a player request that does not fit the player's state.
    #[error("validation error: {0}")]
    Validation(String),

    /// The compiler reported at least one error. Warnings ride along in the same collection.
    #[error("compile failed:\n{0}")]
    Compile(Diagnostics),

    /// A frame failed at runtime. Committed memory and the clock are left as they were.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Patch JSON could not be parsed.
    #[error("serialization error: {0}")]
    Serde(String),

    /// I/O and other foreign failures, with their source chain preserved.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WavepatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Diagnostics of a failed compile, if this error came from the compiler.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Compile(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Diagnostics> for WavepatchError {
    fn from(d: Diagnostics) -> Self {
        Self::Compile(d)
    }
}
