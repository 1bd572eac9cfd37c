use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use ingest_api::{IngestError, StoreSchema, UserRecord, UserStore, ValidatedUser};

// ═══════════════════════════════════════════════════════════════
//  MemoryUserStore
// ═══════════════════════════════════════════════════════════════

/// In-memory таблица пользователей, ключ — `id`.
///
/// Повторный upsert с тем же id заменяет строку, как в wide-column store.
/// Ошибки записи можно подложить заранее (`fail_id`, `fail_next`), чтобы
/// проверить изоляцию сбоев внутри batch'а.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: RwLock<HashMap<Uuid, UserRecord>>,
    schemas: Mutex<Vec<StoreSchema>>,
    failures_by_id: Mutex<HashMap<Uuid, IngestError>>,
    failures_next: Mutex<VecDeque<IngestError>>,
    attempts: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next upsert of `id` fails with `error` (once).
    pub async fn fail_id(&self, id: Uuid, error: IngestError) {
        self.failures_by_id.lock().await.insert(id, error);
    }

    /// The next upsert, whatever its id, fails with `error`. Queued in order.
    pub async fn fail_next(&self, error: IngestError) {
        self.failures_next.lock().await.push_back(error);
    }

    pub async fn get(&self, id: &Uuid) -> Option<UserRecord> {
        self.rows.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of upsert calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Schemas passed to `init`, in call order.
    pub async fn initialized(&self) -> Vec<StoreSchema> {
        self.schemas.lock().await.clone()
    }
}

impl UserStore for MemoryUserStore {
    fn init(&self, schema: &StoreSchema) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        let schema = schema.clone();
        Box::pin(async move {
            let mut schemas = self.schemas.lock().await;
            if !schemas.contains(&schema) {
                schemas.push(schema);
            }
            Ok(())
        })
    }

    fn upsert(&self, user: &ValidatedUser) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        let user = user.clone();
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if let Some(err) = self.failures_next.lock().await.pop_front() {
                return Err(err);
            }
            if let Some(err) = self.failures_by_id.lock().await.remove(&user.id) {
                return Err(err);
            }

            let replaced = self.rows.write().await.insert(user.id, user.record).is_some();
            tracing::trace!(id = %user.id, replaced, "memory upsert");
            Ok(())
        })
    }
}
