// Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latency samples kept for percentile calculation
const LATENCY_WINDOW: usize = 1000;

/// Per-endpoint metrics
#[derive(Debug)]
pub struct EndpointMetrics {
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    latency_samples: Mutex<VecDeque<u64>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            max_latency_ms: AtomicU64::new(0),
            latency_samples: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == LATENCY_WINDOW {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn snapshot(&self) -> EndpointStats {
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for the synthesis pipeline as seen from the server
#[derive(Debug, Default)]
pub struct SynthMetrics {
    pub labels_accepted: AtomicU64,
    pub labels_rejected: AtomicU64,
    pub samples_streamed: AtomicU64,
    pub renders: AtomicU64,
    pub rendered_samples: AtomicU64,
}

impl SynthMetrics {
    pub fn record_accepted(&self, count: usize) {
        self.labels_accepted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, count: usize) {
        self.labels_rejected.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_streamed(&self, samples: usize) {
        self.samples_streamed.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_render(&self, samples: usize) {
        self.renders.fetch_add(1, Ordering::Relaxed);
        self.rendered_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct AppMetrics {
    pub started_at: Instant,
    pub labels: EndpointMetrics,
    pub render: EndpointMetrics,
    pub synth: SynthMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            labels: EndpointMetrics::new(),
            render: EndpointMetrics::new(),
            synth: SynthMetrics::default(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub pipeline: PipelineStats,
    pub endpoints: EndpointMetricsResponse,
}

#[derive(Debug, Serialize)]
pub struct PipelineStats {
    pub worker_state: String,
    pub labels_accepted: u64,
    pub labels_rejected: u64,
    pub labels_processed: u64,
    pub pending_labels: usize,
    pub label_capacity: usize,
    pub buffered_frames: usize,
    pub frame_capacity: usize,
    pub samples_streamed: u64,
    pub renders: u64,
    pub rendered_samples: u64,
}

#[derive(Debug, Serialize)]
pub struct EndpointMetricsResponse {
    pub labels: EndpointStats,
    pub render: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}
