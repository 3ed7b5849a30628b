#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start capture command '{command}': {source}")]
    CaptureSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
}
