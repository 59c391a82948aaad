use thiserror::Error;

/// Transport-level faults. Any of these terminates the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {0}")]
    FrameTooLarge(usize),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("invalid readiness banner")]
    InvalidBanner,
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Fold a raw i/o error, treating EOF as a closed peer.
    pub fn from_io(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(e),
        }
    }
}

/// Codec failures. Parsing never truncates; any violated limit lands here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("input exceeds {limit} bytes")]
    InputTooLarge { limit: usize },
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character at offset {0}")]
    UnexpectedChar(usize),
    #[error("invalid escape at offset {0}")]
    InvalidEscape(usize),
    #[error("control character in string at offset {0}")]
    ControlChar(usize),
    #[error("string exceeds {limit} bytes")]
    StringTooLong { limit: usize },
    #[error("invalid integer at offset {0}")]
    InvalidNumber(usize),
    #[error("object exceeds {limit} fields")]
    TooManyFields { limit: usize },
    #[error("array exceeds {limit} items")]
    ArrayTooLong { limit: usize },
    #[error("nesting deeper than {limit}")]
    TooDeep { limit: usize },
    #[error("trailing characters at offset {0}")]
    TrailingCharacters(usize),
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
}
