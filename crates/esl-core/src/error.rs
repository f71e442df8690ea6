use thiserror::Error;

/// Error taxonomy for the control plane core (§7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Protocol(#[from] esl_protocol::ProtocolError),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("background job failed: {0}")]
    JobFailed(String),

    #[error("timed out waiting for reply")]
    Timeout,

    #[error("connection lost")]
    ConnectionLost,

    #[error("invalid originator or application configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
