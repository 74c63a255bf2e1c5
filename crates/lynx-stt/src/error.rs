//! Error types for the Lynx binding.

use std::fmt;

use thiserror::Error;

/// Status codes returned by the native Lynx library.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success = 0,
    OutOfMemory = 1,
    IoError = 2,
    InvalidArgument = 3,
    StopIteration = 4,
    KeyError = 5,
    InvalidState = 6,
    RuntimeError = 7,
    ActivationError = 8,
    ActivationLimitReached = 9,
    ActivationThrottled = 10,
    ActivationRefused = 11,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "SUCCESS",
            Status::OutOfMemory => "OUT_OF_MEMORY",
            Status::IoError => "IO_ERROR",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::StopIteration => "STOP_ITERATION",
            Status::KeyError => "KEY_ERROR",
            Status::InvalidState => "INVALID_STATE",
            Status::RuntimeError => "RUNTIME_ERROR",
            Status::ActivationError => "ACTIVATION_ERROR",
            Status::ActivationLimitReached => "ACTIVATION_LIMIT_REACHED",
            Status::ActivationThrottled => "ACTIVATION_THROTTLED",
            Status::ActivationRefused => "ACTIVATION_REFUSED",
        };
        f.write_str(name)
    }
}

/// A failure reported by the native engine, including the diagnostic
/// message stack recovered via `lynx_get_error_stack`.
#[derive(Debug, Clone)]
pub struct EngineFailure {
    pub status: Status,
    pub context: String,
    pub message_stack: Vec<String>,
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.context)?;
        if !self.message_stack.is_empty() {
            write!(f, ":")?;
        }
        for (i, message) in self.message_stack.iter().enumerate() {
            write!(f, "\n  [{}] {}", i, message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LynxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("failed to load engine library: {0}")]
    LibraryLoad(String),

    #[error("audio frame has {got} samples, engine expects {want}")]
    FrameLength { got: usize, want: usize },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("{0}")]
    Engine(EngineFailure),
}

impl LynxError {
    /// Engine status if this error originated inside the native library.
    pub fn status(&self) -> Option<Status> {
        match self {
            LynxError::Engine(failure) => Some(failure.status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_renders_message_stack() {
        let failure = EngineFailure {
            status: Status::ActivationError,
            context: "engine initialization failed".to_string(),
            message_stack: vec![
                "access key is invalid".to_string(),
                "contact support to renew the license".to_string(),
            ],
        };
        let rendered = failure.to_string();
        assert_eq!(
            rendered,
            "ACTIVATION_ERROR: engine initialization failed:\n  \
             [0] access key is invalid\n  \
             [1] contact support to renew the license"
        );
    }

    #[test]
    fn engine_failure_without_stack_has_no_trailing_colon() {
        let failure = EngineFailure {
            status: Status::RuntimeError,
            context: "process failed".to_string(),
            message_stack: Vec::new(),
        };
        assert_eq!(failure.to_string(), "RUNTIME_ERROR: process failed");
    }

    #[test]
    fn status_accessor_only_set_for_engine_errors() {
        let err = LynxError::InvalidArgument("access key is empty".to_string());
        assert_eq!(err.status(), None);

        let err = LynxError::Engine(EngineFailure {
            status: Status::OutOfMemory,
            context: "process failed".to_string(),
            message_stack: Vec::new(),
        });
        assert_eq!(err.status(), Some(Status::OutOfMemory));
    }
}
