/// Crate-wide result alias.
pub type LivemuxResult<T> = Result<T, LivemuxError>;

/// Error taxonomy for the streaming pipeline.
///
/// Resource-lifecycle errors (`ProcessLaunch`, `PipeWrite`, `ProcessWait`) always propagate
/// to the session controller, which guarantees cleanup on the error path. Seek and skip
/// errors (`CacheMissOnSkip`, `OutOfRange`) are recoverable at the session level.
#[derive(thiserror::Error, Debug)]
pub enum LivemuxError {
    /// Input or configuration rejected before any process was touched.
    #[error("validation error: {0}")]
    Validation(String),

    /// The external encoder executable could not be started.
    #[error("process launch error: {0}")]
    ProcessLaunch(String),

    /// The encoder's input pipe is closed or the process died mid-stream.
    #[error("pipe write error: {0}")]
    PipeWrite(String),

    /// The encoder process could not be waited on, or exited abnormally.
    #[error("process wait error: {0}")]
    ProcessWait(String),

    /// A skip-and-replay was requested but no cached segment exists.
    #[error("cache miss on skip: {0}")]
    CacheMissOnSkip(String),

    /// API misuse, e.g. feeding frames while replaying.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Seek beyond the recorded animation history.
    #[error("seek out of range: {0}")]
    OutOfRange(String),

    /// Behavior that is deliberately not implemented yet.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Configuration (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped external error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LivemuxError {
    /// Build a [`LivemuxError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`LivemuxError::ProcessLaunch`].
    pub fn process_launch(msg: impl Into<String>) -> Self {
        Self::ProcessLaunch(msg.into())
    }

    /// Build a [`LivemuxError::PipeWrite`].
    pub fn pipe_write(msg: impl Into<String>) -> Self {
        Self::PipeWrite(msg.into())
    }

    /// Build a [`LivemuxError::ProcessWait`].
    pub fn process_wait(msg: impl Into<String>) -> Self {
        Self::ProcessWait(msg.into())
    }

    /// Build a [`LivemuxError::CacheMissOnSkip`].
    pub fn cache_miss(msg: impl Into<String>) -> Self {
        Self::CacheMissOnSkip(msg.into())
    }

    /// Build a [`LivemuxError::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Build a [`LivemuxError::OutOfRange`].
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Build a [`LivemuxError::Unsupported`].
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Build a [`LivemuxError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
