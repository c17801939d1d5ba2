use thiserror::Error;

/// Failures talking to the control server. None of these are fatal to the
/// controller; callers keep their last known value and retry on the next
/// scheduled sync.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("connection to control server failed: {0}")]
    Connect(String),
    #[error("control server did not respond within {0} ms")]
    Timeout(u64),
    #[error("control server transport error: {0}")]
    Transport(String),
    #[error("control server i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("control server returned status {0}")]
    Status(u16),
    #[error("json decoding error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("device state is missing `{0}`")]
    MissingField(String),
    #[error("control server sent an unusable value: {0}")]
    InvalidValue(f32),
}
