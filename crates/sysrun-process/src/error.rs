use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn '{display_name}': {source}")]
    Spawn {
        display_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process '{display_name}' (pid {pid}) timed out after {timeout_secs} secs")]
    Timeout {
        display_name: String,
        pid: u32,
        timeout_secs: u64,
    },

    #[error("cannot signal a process that is not running: '{0}'")]
    NotRunning(String),

    #[error("signals are not supported on this platform")]
    SignalsUnsupported,

    #[error("failed to send signal {signal} to '{display_name}': {source}")]
    Signal {
        display_name: String,
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("process '{0}' was not started with a piped stdin")]
    StdinNotPiped(String),

    #[error("failed to write to stdin of '{display_name}': {source}")]
    Write {
        display_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open stdout/stderr capture file '{path}': {source}")]
    OpenCapture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process '{display_name}': {source}")]
    Wait {
        display_name: String,
        #[source]
        source: std::io::Error,
    },
}
