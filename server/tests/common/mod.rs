//! Common utilities for router tests

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use server::{build_router, config::ServerConfig, AppState};
use synth_core::{EngineArgs, PipelineConfig};
use tower::ServiceExt;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        sample_rate: Some(16_000),
        ..ServerConfig::default()
    }
}

pub fn test_pipeline(label_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        max_label_queue_len: label_capacity,
        ..PipelineConfig::default()
    }
}

/// Create a test app around a real worker.
pub fn create_test_app(pipeline: PipelineConfig) -> (Router, AppState) {
    let state = AppState::new(test_config(), pipeline, EngineArgs::default())
        .expect("failed to build app state");
    (build_router(state.clone()), state)
}

/// Same, with the worker already stopped so queued labels stay put.
pub fn create_stopped_app(label_capacity: usize) -> (Router, AppState) {
    let (app, state) = create_test_app(test_pipeline(label_capacity));
    state.worker.stop();
    (app, state)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
