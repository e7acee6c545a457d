use thiserror::Error;

/// Text shown to the user whenever a voice session cannot be started.
pub const START_FAILURE_MESSAGE: &str = "Microphone access and a valid connection are required.";

/// Errors raised by the local audio devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("microphone unavailable: {0}")]
    Microphone(String),
    #[error("audio output unavailable: {0}")]
    Output(String),
}

/// Terminal failures of a voice session.
///
/// None of these are retried; the application starts a fresh session instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("connection closed by remote: {0}")]
    Closed(String),
}

impl SessionError {
    /// The generic user-facing message for this failure.
    pub fn user_message(&self) -> &'static str {
        START_FAILURE_MESSAGE
    }
}
