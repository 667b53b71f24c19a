//! Song service business logic

pub mod catalog;
pub mod enrichment;
pub mod ingest;
