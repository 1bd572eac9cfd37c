pub mod config;
pub mod error;
mod driver;
mod parser;
mod upsert;

pub use config::PipelineConfig;
pub use driver::{BatchDriver, DriverState, Exit, Totals};
pub use error::PipelineError;
pub use parser::{parse_batch, parse_message};
pub use upsert::{BatchReport, RecordOutcome, UpsertExecutor};
