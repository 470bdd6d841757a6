// Configuration for the HTTP surface

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Engine configuration file (whitespace separated tokens).
    pub engine_config: Option<PathBuf>,
    /// Overrides the engine's sampling rate when set.
    pub sample_rate: Option<u32>,
    pub stream_chunk_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            engine_config: None,
            sample_rate: None,
            stream_chunk_ms: 20,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8085);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let engine_config = std::env::var("ENGINE_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let sample_rate = std::env::var("SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&rate: &u32| rate > 0);

        let stream_chunk_ms = std::env::var("STREAM_CHUNK_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&ms: &u64| ms > 0)
            .unwrap_or(20);

        Self {
            port,
            request_timeout_secs,
            cors_allowed_origins,
            engine_config,
            sample_rate,
            stream_chunk_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_chunk(&self) -> Duration {
        Duration::from_millis(self.stream_chunk_ms)
    }

    /// Samples per streamed chunk at `sample_rate`.
    pub fn chunk_samples(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.stream_chunk_ms) / 1000).max(1) as usize
    }
}
