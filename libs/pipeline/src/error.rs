use ingest_api::IngestError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("source: {0}")]
    Source(IngestError),

    #[error("store lost during batch {batch_id}: {source}")]
    StoreLost { batch_id: u64, source: IngestError },
}
