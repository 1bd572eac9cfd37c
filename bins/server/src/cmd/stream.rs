use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Effective;
use crate::error::ServerError;
use ingest_api::{IngestError, UserStore};
use pipeline::{BatchDriver, Exit};
use source_kafka::KafkaSource;
use storage_cassandra::CassandraStore;

#[cfg(unix)]
async fn shutdown_signal(
    mut terminate: tokio::signal::unix::Signal,
) -> std::io::Result<()> {
    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = terminate.recv() => Ok(()),
    }
}

pub async fn run(eff: Effective) -> Result<(), ServerError> {
    tracing::info!(
        bus = %eff.source.bootstrap_servers,
        store = ?eff.store_nodes,
        topic = %eff.source.topic,
        keyspace = %eff.store_schema.keyspace,
        table = %eff.store_schema.table,
        "users-stream starting"
    );

    // Register before connecting so an early SIGTERM is not lost.
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // --- Store: session + keyspace/table ---
    let store = CassandraStore::connect(&eff.store_nodes, eff.connect_timeout)
        .await
        .map_err(ServerError::Store)?;
    store.init(&eff.store_schema).await.map_err(ServerError::Store)?;
    let store: Arc<dyn UserStore> = Arc::new(store);

    // --- Bus: consumer + subscription (librdkafka calls block) ---
    let source_cfg = eff.source.clone();
    let timeout = eff.connect_timeout;
    let source = tokio::task::spawn_blocking(move || KafkaSource::connect(&source_cfg, timeout))
        .await
        .map_err(|e| ServerError::Bus(IngestError::io(format!("kafka connect task: {e}"))))?
        .map_err(ServerError::Bus)?;

    let mut driver = BatchDriver::new(Box::new(source), store, &eff.pipeline);

    // --- Ожидание Ctrl+C / SIGTERM ---
    let token = CancellationToken::new();
    let signal_token = token.clone();
    let signals = tokio::spawn(async move {
        #[cfg(unix)]
        let received = shutdown_signal(terminate).await;
        #[cfg(not(unix))]
        let received = tokio::signal::ctrl_c().await;

        match received {
            Ok(()) => tracing::info!("shutting down..."),
            Err(e) => tracing::error!(error = %e, "signal listener failed, shutting down"),
        }
        signal_token.cancel();
    });

    tracing::info!("pipeline ready");
    let result = driver.run(token).await;
    signals.abort();

    let totals = driver.totals();
    tracing::info!(
        batches = totals.batches,
        messages = totals.messages,
        written = totals.written,
        dropped = totals.dropped,
        rejected = totals.rejected,
        failed = totals.failed,
        "shutdown complete"
    );

    match result? {
        Exit::Cancelled => Ok(()),
        Exit::SourceClosed => {
            tracing::warn!("bus closed the subscription");
            Ok(())
        }
    }
}
