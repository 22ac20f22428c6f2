use thiserror::Error;

/// Outcome of a load or a guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    SyntaxError,
    /// A syntax error caused only by the source ending early
    SyntaxIncomplete,
    RuntimeError,
    OutOfMemory,
    Interrupted,
    /// A script or init file could not be read
    FileError,
}

/// A failed load or call, carrying the final diagnostic text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Failure {
    pub status: Status,
    pub message: String,
}

impl Failure {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(Status::RuntimeError, message)
    }
}

/// Collapse a result into its status
pub fn status_of<T>(result: &Result<T, Failure>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(failure) => failure.status,
    }
}
