pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod render;
pub mod stream;
pub mod validation;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use synth_core::{
    Engine, EngineArgs, PipelineConfig, Playback, PulseVocoder, ReferenceEngine, Scheduler, Worker,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
    pub playback: Arc<Mutex<Playback<PulseVocoder>>>,
    pub metrics: Arc<AppMetrics>,
    pub config: ServerConfig,
    pub pipeline: PipelineConfig,
    pub engine_args: EngineArgs,
    pub sample_rate: u32,
    pub fperiod: usize,
}

impl AppState {
    /// Load the engine, start the synthesis worker and set up playback.
    pub fn new(
        config: ServerConfig,
        pipeline: PipelineConfig,
        engine_args: EngineArgs,
    ) -> synth_core::Result<Self> {
        let engine_args = with_sample_rate(engine_args, config.sample_rate)?;
        let mut engine = ReferenceEngine::new();
        engine.load(&engine_args)?;
        let sample_rate = engine.sample_rate();
        let fperiod = engine.fperiod();

        let scheduler = Scheduler::new(engine, &pipeline)?;
        let worker = Worker::spawn(scheduler, &pipeline)?;
        let playback = Playback::new(PulseVocoder::new(sample_rate, fperiod));

        Ok(Self {
            worker: Arc::new(worker),
            playback: Arc::new(Mutex::new(playback)),
            metrics: Arc::new(AppMetrics::new()),
            config,
            pipeline,
            engine_args,
            sample_rate,
            fperiod,
        })
    }

    /// Playback survives a panicked holder; its state is plain numbers.
    pub fn playback(&self) -> MutexGuard<'_, Playback<PulseVocoder>> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Append a `-s` override so the configured rate wins over the file.
fn with_sample_rate(args: EngineArgs, sample_rate: Option<u32>) -> synth_core::Result<EngineArgs> {
    match sample_rate {
        Some(rate) => {
            let mut tokens = args.as_slice().to_vec();
            tokens.push("-s".to_string());
            tokens.push(rate.to_string());
            EngineArgs::new(tokens)
        }
        None => Ok(args),
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let Some(ref allowed_origins) = config.cors_allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(tower_http::cors::Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

pub fn build_router(state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors_layer(&state.config))
        .into_inner();

    let public_api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/labels", post(handlers::push_labels))
        .route("/controls", get(handlers::get_controls).post(handlers::set_controls))
        .route("/render", post(render::render_endpoint))
        .route("/stream", get(stream::stream_ws));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(handlers::metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}
