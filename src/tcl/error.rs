//! Error types shared by the server, the client and the wire protocol.

use thiserror::Error;

/// Errors that can occur while framing or exchanging a [`crate::message::Request`]/
/// [`crate::message::Response`] over a [`tokio::net::TcpStream`].
#[derive(Debug, Error)]
pub enum TaskmasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_yaml::Error),

    #[error("message exceeds the maximum allowed length")]
    MessageTooLong,

    #[error("{0}")]
    Custom(String),
}

impl TaskmasterError {
    /// True when the underlying IO error is the one produced by a peer
    /// closing its half of the connection mid-read, i.e. the client hung up.
    pub fn client_disconnected(&self) -> bool {
        matches!(
            self,
            TaskmasterError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }

    /// True when this error wraps the interactive shell's own EOF sentinel
    /// (the operator pressed Ctrl+D).
    pub fn is_unexpected_end_of_file(&self) -> bool {
        matches!(
            self,
            TaskmasterError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }
}

/// Errors raised while loading or validating a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config has neither a `programs` map nor a `services` list")]
    MissingRoot,

    #[error("program `{name}`: {reason}")]
    InvalidProgram { name: String, reason: String },

    #[error("program `{0}` is declared more than once")]
    DuplicateName(String),
}

/// Errors raised while spawning or signalling an instance's child process.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("user `{user}` does not match the supervisor's effective user and the supervisor is not privileged")]
    UserMismatch { user: String },

    #[error("command line is empty after tokenization")]
    EmptyCommand,

    #[error("failed to spawn child: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("no live child to signal")]
    NoChild,

    #[error("failed to signal child: {0}")]
    Signal(#[source] std::io::Error),

    #[error("child exited during its start-up window (code {code:?})")]
    EarlyExit { code: Option<i32> },
}
