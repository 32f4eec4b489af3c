use thiserror::Error;

/// Transport- and framing-level failures from a bridge's reader thread or
/// stdin writer. A bridge degrading with one of these simply stops itself;
/// the turn engine only ever observes the absence of further messages.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("child process `{0}` not found on PATH")]
    ExecutableNotFound(String),

    #[error("failed to spawn `{0}`: {1}")]
    Spawn(String, #[source] std::io::Error),

    #[error("stdin pipe closed")]
    BrokenPipe,

    #[error("line exceeded max length of {0} bytes")]
    LineTooLong(usize),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("timed out waiting for response")]
    Timeout,

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("bridge is not running")]
    NotRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TurnEngineError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not resolve $HOME")]
    NoHomeDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to atomically write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings root is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error)]
pub enum PermissionSocketError {
    #[error("failed to bind socket at {path}: {source}")]
    Bind {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed hook request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("timed out waiting for hook request")]
    Timeout,
}
