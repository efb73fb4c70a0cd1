//! Scan worker pool and ingestion pipeline.

mod ingest;
mod pool;
mod queue;

pub(crate) use ingest::IngestPipeline;
pub(crate) use pool::{ScanItemHandler, ScanWorkerPool};
pub(crate) use queue::ScanQueue;
