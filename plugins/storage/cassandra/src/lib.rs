mod cql;

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::errors::{ConnectionPoolError, ExecutionError};
use scylla::statement::prepared::PreparedStatement;

use ingest_api::{IngestError, StoreSchema, UserStore, ValidatedUser};

pub use cql::is_cql_identifier;

/// Map a request error onto the pipeline's taxonomy. Failures that mean the
/// session cannot reach any node are fatal; anything scoped to the single
/// request may succeed on the next record.
pub fn classify(e: &ExecutionError) -> IngestError {
    match e {
        ExecutionError::EmptyPlan | ExecutionError::ConnectionPoolError(ConnectionPoolError::Broken { .. }) => {
            IngestError::fatal(format!("cassandra: {e}"))
        }
        _ => IngestError::io(format!("cassandra: {e}")),
    }
}

/// Cassandra / ScyllaDB `UserStore`.
///
/// Одна долгоживущая session на процесс. Upsert — подготовленный
/// `INSERT` по первичному ключу `id`: повторная запись того же id
/// заменяет строку, поэтому повторная доставка из шины безопасна.
pub struct CassandraStore {
    session: Session,
    insert: OnceLock<PreparedStatement>,
}

impl CassandraStore {
    /// Connect to the cluster through any of `contact_points` (`host:port`).
    pub async fn connect(contact_points: &[String], timeout: Duration) -> Result<Self, IngestError> {
        if contact_points.is_empty() {
            return Err(IngestError::config("no store contact points"));
        }
        let session = SessionBuilder::new()
            .known_nodes(contact_points)
            .connection_timeout(timeout)
            .build()
            .await
            .map_err(|e| IngestError::io(format!("cassandra connect {contact_points:?}: {e}")))?;
        tracing::info!(nodes = ?contact_points, "cassandra session created");
        Ok(Self { session, insert: OnceLock::new() })
    }

    async fn exec_ddl(&self, cql: &str) -> Result<(), IngestError> {
        self.session
            .query_unpaged(cql, ())
            .await
            .map_err(|e| classify(&e))?;
        Ok(())
    }
}

impl UserStore for CassandraStore {
    fn init(&self, schema: &StoreSchema) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        let schema = schema.clone();
        Box::pin(async move {
            for name in [&schema.keyspace, &schema.table] {
                if !is_cql_identifier(name) {
                    return Err(IngestError::config(format!("'{name}' is not a valid CQL identifier")));
                }
            }

            self.exec_ddl(&cql::create_keyspace(&schema)).await?;
            tracing::info!(keyspace = %schema.keyspace, "keyspace ready");
            self.exec_ddl(&cql::create_table(&schema)).await?;
            tracing::info!(keyspace = %schema.keyspace, table = %schema.table, "table ready");

            let prepared = self
                .session
                .prepare(cql::insert(&schema))
                .await
                .map_err(|e| IngestError::io(format!("cassandra prepare insert: {e}")))?;
            if self.insert.set(prepared).is_err() {
                tracing::debug!("insert statement already prepared");
            }
            Ok(())
        })
    }

    fn upsert(&self, user: &ValidatedUser) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        let user = user.clone();
        Box::pin(async move {
            let insert = self
                .insert
                .get()
                .ok_or_else(|| IngestError::config("store used before init"))?;

            let [first_name, last_name, gender, address, post_code, email, username, dob, registered_date, phone, picture] =
                user.record.text_columns();
            let values = (
                user.id,
                first_name,
                last_name,
                gender,
                address,
                post_code,
                email,
                username,
                dob,
                registered_date,
                phone,
                picture,
            );

            self.session
                .execute_unpaged(insert, values)
                .await
                .map_err(|e| classify(&e))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_api::ErrorKind;

    #[test]
    fn unreachable_cluster_is_fatal() {
        assert_eq!(classify(&ExecutionError::EmptyPlan).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn pool_still_initializing_is_transient() {
        let e = ExecutionError::ConnectionPoolError(ConnectionPoolError::Initializing);
        assert_eq!(classify(&e).kind(), ErrorKind::Io);
    }
}
