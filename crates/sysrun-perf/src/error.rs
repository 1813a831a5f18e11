#[derive(thiserror::Error, Debug)]
pub enum PerfError {
    #[error("invalid result key '{key}': {reason}")]
    InvalidResultKey { key: String, reason: String },

    #[error("failed to write performance file '{path}': {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read performance file '{path}': {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed performance record in '{path}' at line {line}: {reason}")]
    Parse { path: std::path::PathBuf, line: usize, reason: String },

    #[error("cannot aggregate an empty set of performance files")]
    EmptyAggregateInput,
}
