// LogStitch - app/mod.rs
//
// Application layer: profile loading and background ingestion.
// Dependencies: core layer.

pub mod ingest;
pub mod profile_mgr;
