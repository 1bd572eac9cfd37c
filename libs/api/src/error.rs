/// Category of an ingestion error. Lets the pipeline decide whether a
/// failure stays with one record, is retried, or ends the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration — permanent, fail at startup.
    Config,
    /// I/O or network error — transient, the next attempt may succeed.
    Io,
    /// Payload could not be decoded — bad input, skip record.
    Format,
    /// Record decoded but violates the schema contract (e.g. bad id).
    Validation,
    /// Connection to bus or store is gone for good.
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

/// Unified error type for sources and stores.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the appropriate kind automatically.
#[derive(Clone, PartialEq, Eq)]
pub struct IngestError {
    kind: ErrorKind,
    message: String,
}

impl IngestError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    /// Configuration error — permanent, fail at startup.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    /// I/O error — transient, may retry/reconnect.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    /// Format/parse error — bad input, skip record.
    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    /// Unrecoverable loss of an external system.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }
}

impl std::fmt::Debug for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self { Self::io(e.to_string()) }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self { Self::format_err(e.to_string()) }
}

impl From<std::str::Utf8Error> for IngestError {
    fn from(e: std::str::Utf8Error) -> Self { Self::format_err(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_impls_assign_kind() {
        let io: IngestError = std::io::Error::other("reset by peer").into();
        assert_eq!(io.kind(), ErrorKind::Io);

        let json: IngestError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(json.kind(), ErrorKind::Format);
    }

    #[test]
    fn debug_shows_kind() {
        let e = IngestError::fatal("broker gone");
        assert!(e.is_fatal());
        assert_eq!(format!("{e:?}"), "[fatal] broker gone");
        assert_eq!(e.to_string(), "broker gone");
    }
}
