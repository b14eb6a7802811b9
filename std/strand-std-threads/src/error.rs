///
/// Threading error types.
///
/// Every failure the threading primitives report. None of them are retried
/// internally; native failures surface immediately at the call site.
///

use thiserror::Error;

use crate::thread::Thread;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("Thread {name} was never started")]
    NotStarted { name: String },

    #[error("Thread {name} has already run")]
    AlreadyStarted { name: String },

    #[error("Thread {} is still running", .thread.name())]
    StillRunning { thread: Thread },

    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Thread {name} cannot join itself")]
    JoinSelf { name: String },

    #[error("Thread {name} panicked: {message}")]
    Panicked { name: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Condition waited on without holding its lock")]
    NotLocked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ThreadError::NotStarted {
            name: "strand-1".to_string(),
        };
        assert!(err.to_string().contains("never started"));
        assert!(err.to_string().contains("strand-1"));

        let err = ThreadError::Spawn {
            name: "strand-2".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no memory"),
        };
        assert!(err.to_string().contains("Failed to spawn"));
        assert!(err.to_string().contains("no memory"));

        let err = ThreadError::Panicked {
            name: "strand-3".to_string(),
            message: "boom".to_string(),
        };
        assert!(err.to_string().contains("panicked: boom"));

        assert!(SyncError::NotLocked.to_string().contains("without holding"));
    }
}
