use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::state::AppState;

#[derive(Default)]
struct Timer {
    total_us: AtomicU64,
    count: AtomicUsize,
}

impl Timer {
    fn record(&self, duration: Duration) {
        self.total_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_us.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }
}

/// Process-wide request and pipeline counters.
#[derive(Default)]
pub struct Metrics {
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    ingest: Timer,
    extract: Timer,
    index: Timer,
    query: Timer,

    documents_ingested: AtomicUsize,
    chunks_processed: AtomicUsize,
    entities_extracted: AtomicUsize,
    relations_extracted: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Parse and segmentation of one document.
    pub fn record_ingest(&self, duration: Duration, chunks: usize) {
        self.ingest.record(duration);
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed.fetch_add(chunks, Ordering::Relaxed);
    }

    pub fn record_extract(&self, duration: Duration, entities: usize, relations: usize) {
        self.extract.record(duration);
        self.entities_extracted.fetch_add(entities, Ordering::Relaxed);
        self.relations_extracted
            .fetch_add(relations, Ordering::Relaxed);
    }

    pub fn record_index(&self, duration: Duration) {
        self.index.record(duration);
    }

    pub fn record_query(&self, duration: Duration) {
        self.query.record(duration);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_ingest_time_ms: self.ingest.avg_ms(),
            avg_extract_time_ms: self.extract.avg_ms(),
            avg_index_time_ms: self.index.avg_ms(),
            avg_query_time_ms: self.query.avg_ms(),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            total_chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            total_entities_extracted: self.entities_extracted.load(Ordering::Relaxed),
            total_relations_extracted: self.relations_extracted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_extract_time_ms: f64,
    pub avg_index_time_ms: f64,
    pub avg_query_time_ms: f64,
    pub documents_ingested: usize,
    pub total_chunks_processed: usize,
    pub total_entities_extracted: usize,
    pub total_relations_extracted: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Counts every request; 4xx and 5xx responses count as failures.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    state
        .metrics
        .record_request(!(status.is_client_error() || status.is_server_error()));
    response
}
