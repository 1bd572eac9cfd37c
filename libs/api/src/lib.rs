pub mod error;
pub mod schema;
pub mod types;

pub use error::{ErrorKind, IngestError};
pub use schema::{ColumnType, Field, StoreSchema, USER_FIELDS, UserRecord, ValidatedUser, field_names};
pub use types::{BatchSource, MicroBatch, RawMessage, UserStore};
