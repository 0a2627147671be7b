//! Upload ingestion: store the asset and analyse it in one pass.

mod pipeline;
mod types;

pub use pipeline::{check_filename, ingest, MAX_FILENAME_LEN};
pub use types::IngestResult;
