use ingest_api::IngestError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("store: {0}")]
    Store(IngestError),

    #[error("bus: {0}")]
    Bus(IngestError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl ServerError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        ServerError::Config { context: "validate", detail: detail.into() }
    }
}
