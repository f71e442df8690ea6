use thiserror::Error;

/// Failures produced while framing or parsing ESL wire data.
///
/// All variants are fatal for the connection that produced them (§4.1):
/// the framer itself carries no recovery strategy beyond reporting what
/// went wrong at which byte offset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("header block exceeded without a terminating blank line")]
    UnterminatedHeaders,

    #[error("invalid percent-encoding in header value: {0:?}")]
    InvalidPercentEncoding(String),

    #[error("Content-Length header {0:?} is not a valid length")]
    InvalidContentLength(String),

    #[error("body shorter than declared Content-Length: expected {expected}, got {got}")]
    ShortBody { expected: usize, got: usize },

    #[error("unknown Content-Type: {0:?}")]
    UnknownContentType(String),

    #[error("missing Content-Type header")]
    MissingContentType,

    #[error("event body did not parse as a nested header block: {0}")]
    MalformedEventBody(String),

    #[error("message body is not valid UTF-8")]
    InvalidUtf8,
}
