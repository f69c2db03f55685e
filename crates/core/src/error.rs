//! Error types for the unlocking engine.

use thiserror::Error;

/// Primary error type for parsing, authentication and rewriting.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(u32),

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("invalid padding after AES decryption")]
    InvalidPadding,

    #[error("SASLprep: {0}")]
    SaslPrepError(String),

    #[error("encryption dictionary error: {0}")]
    EncryptionError(String),

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("unsupported security handler or crypt filter: {0}")]
    UnsupportedFilter(String),

    #[error("deadline exceeded after {0} items")]
    DeadlineExceeded(usize),
}

/// Coarse classification reported to callers and batch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The candidate password failed verification.
    Password,
    /// Grammar violation, bad xref data or invalid padding.
    CorruptDocument,
    /// Handler, revision or crypt filter not implemented.
    UnsupportedFilter,
    /// Read or write failure at the storage boundary.
    Io,
    /// The caller-supplied deadline elapsed.
    Deadline,
    /// A worker panicked while processing a file.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Password => "password",
            Self::CorruptDocument => "corrupt document",
            Self::UnsupportedFilter => "unsupported filter",
            Self::Io => "io",
            Self::Deadline => "deadline",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl PdfError {
    /// Map onto the coarse error taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IncorrectPassword | Self::SaslPrepError(_) => ErrorKind::Password,
            Self::UnsupportedFilter(_) => ErrorKind::UnsupportedFilter,
            Self::Io(_) => ErrorKind::Io,
            Self::DeadlineExceeded(_) => ErrorKind::Deadline,
            Self::TokenError { .. }
            | Self::UnexpectedEof
            | Self::TypeError { .. }
            | Self::KeyError(_)
            | Self::ObjectNotFound(_)
            | Self::NoValidXRef
            | Self::SyntaxError(_)
            | Self::DecodeError(_)
            | Self::InvalidPadding
            | Self::EncryptionError(_) => ErrorKind::CorruptDocument,
        }
    }

    /// True when no other password can help.
    pub const fn is_fatal_for_search(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Password)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
