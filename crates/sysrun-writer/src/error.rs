use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum WriterError {
    #[error("failed to open results file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write results file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
