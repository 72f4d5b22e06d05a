use std::fmt;

use thiserror::Error;

pub type SealboxResult<T> = Result<T, SealboxError>;

#[derive(Debug, Error)]
pub enum SealboxError {
    /// The OS random source failed; no key or nonce can be generated safely.
    #[error("random source unavailable: {0}")]
    RandomSourceUnavailable(String),

    /// Bulk ciphertext failed its integrity check (or is shorter than a nonce).
    #[error("authentication failed: ciphertext is corrupted, tampered, or keyed differently")]
    AuthenticationError,

    /// Serialized metadata does not fit in one asymmetric block.
    #[error("metadata too large to wrap: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Wrapped key could not be opened with this private key.
    #[error("key unwrap failed")]
    UnwrapError,

    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("key parse error: {0}")]
    KeyParseError(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`SealboxError`], used for per-item reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RandomSourceUnavailable,
    Authentication,
    PayloadTooLarge,
    Unwrap,
    MalformedMetadata,
    MalformedEnvelope,
    KeyParse,
    Config,
    Io,
    Other,
}

impl SealboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RandomSourceUnavailable(_) => ErrorKind::RandomSourceUnavailable,
            Self::AuthenticationError => ErrorKind::Authentication,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::UnwrapError => ErrorKind::Unwrap,
            Self::MalformedMetadata(_) => ErrorKind::MalformedMetadata,
            Self::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            Self::KeyParseError(_) => ErrorKind::KeyParse,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Fatal errors abort the whole run; everything else only fails one item.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub fn timed_out(what: impl fmt::Display) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{what}: timed out"),
        ))
    }
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::RandomSourceUnavailable | ErrorKind::KeyParse | ErrorKind::Config
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RandomSourceUnavailable => "random-source-unavailable",
            ErrorKind::Authentication => "authentication",
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::Unwrap => "unwrap",
            ErrorKind::MalformedMetadata => "malformed-metadata",
            ErrorKind::MalformedEnvelope => "malformed-envelope",
            ErrorKind::KeyParse => "key-parse",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(SealboxError::RandomSourceUnavailable("gone".into()).is_fatal());
        assert!(SealboxError::KeyParseError("bad pem".into()).is_fatal());
        assert!(SealboxError::Config("both modes".into()).is_fatal());

        assert!(!SealboxError::AuthenticationError.is_fatal());
        assert!(!SealboxError::UnwrapError.is_fatal());
        assert!(!SealboxError::PayloadTooLarge { len: 300, max: 190 }.is_fatal());
        assert!(!SealboxError::MalformedMetadata("x".into()).is_fatal());
        assert!(!SealboxError::Io(std::io::Error::other("disk")).is_fatal());
    }

    #[test]
    fn test_unwrap_message_is_uninformative() {
        // One message for every unwrap failure mode.
        assert_eq!(SealboxError::UnwrapError.to_string(), "key unwrap failed");
    }

    #[test]
    fn test_timed_out_is_io() {
        let err = SealboxError::timed_out("reading blob");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::PayloadTooLarge.to_string(), "payload-too-large");
        assert_eq!(SealboxError::AuthenticationError.kind().as_str(), "authentication");
    }
}
