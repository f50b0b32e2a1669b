#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_connection;
pub mod mock_runner;
pub mod recording_sink;
pub mod strategies;

pub use mock_connection::*;
pub use mock_runner::*;
pub use recording_sink::*;
pub use strategies::*;

use std::sync::Arc;

use dbm_async_core::jobs::{JobRegistry, JobSettings, WorkerPool};

pub const TEST_DBMS: &str = "test-dbms";
pub const TEST_JOB: &str = "test-job";

/// Worker pool, recording sink and registry for one simulated check
pub fn test_harness(max_workers: usize) -> (Arc<WorkerPool>, Arc<RecordingSink>, JobRegistry) {
    let pool = WorkerPool::new(max_workers).expect("tests run inside a Tokio runtime");
    let sink = Arc::new(RecordingSink::default());
    let registry = JobRegistry::new("test-check", Arc::clone(&pool), sink.clone());
    (pool, sink, registry)
}

/// Settings mirroring a typical job under test: fast rate, no interval
pub fn test_settings() -> JobSettings {
    JobSettings::new(TEST_JOB, TEST_DBMS, "test-host")
        .with_rate_limit(10.0)
        .with_min_collection_interval(std::time::Duration::ZERO)
}
