/// Infrastructure-level failures: problems setting up the sandbox a test
/// runs in, not outcomes produced *by* a test. These always record
/// [`crate::Outcome::Blocked`] against the affected test and never abort the
/// runner itself.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("failed to create output directory '{path}': {source}")]
    CreateOutputDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to purge output directory '{path}': {source}")]
    PurgeOutputDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open per-test log file '{path}': {source}")]
    OpenLogFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no test factory registered for class name '{0}'")]
    UnknownTestClass(String),

    #[error("invalid condition expression '{0}': expected a comparator like '>=1', '==1', '>2'")]
    InvalidCondition(String),

    #[error("invalid result key '{key}': {reason}")]
    InvalidResultKey { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_test_class() {
        let err = AppError::UnknownTestClass("FrobnicateTest".into());
        assert_eq!(
            err.to_string(),
            "no test factory registered for class name 'FrobnicateTest'"
        );
    }

    #[test]
    fn display_invalid_condition() {
        let err = AppError::InvalidCondition("~=1".into());
        assert!(err.to_string().contains("~=1"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
