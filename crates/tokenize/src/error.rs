//! Tokenizer error types.

use thiserror::Error;

/// Errors raised while building, using or persisting a tokenizer.
#[derive(Debug, Error)]
pub enum TokenizerError {
    /// Invalid tokenizer configuration (unknown kind, missing token list, unsupported flag).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The same atom was given two indices.
    #[error("vocabulary integrity: duplicate atom {0:?}")]
    DuplicateAtom(String),

    /// The same index was given to two atoms.
    #[error("vocabulary integrity: duplicate index {0}")]
    DuplicateIndex(u32),

    /// An atom or character is absent from a frozen vocabulary.
    #[error("out of vocabulary: {0:?}")]
    OutOfVocabulary(String),

    /// An index has no decoder entry.
    #[error("index {0} has no decoder entry")]
    DecodeKeyMissing(u32),

    /// Operation not supported by this tokenizer kind.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A discovery worker failed; the whole pass is aborted.
    #[error("vocabulary discovery failed: {0}")]
    Discovery(String),

    /// The source formatter collaborator failed.
    #[error("formatter failed: {0}")]
    Format(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TokenizerError {
    /// True for the two vocabulary integrity variants.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::DuplicateAtom(_) | Self::DuplicateIndex(_))
    }
}

/// Result type for tokenizer operations
pub type Result<T> = std::result::Result<T, TokenizerError>;
