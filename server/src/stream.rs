use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::AppState;

pub async fn stream_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_audio(socket, state))
}

/// Little-endian `f32` bytes of `samples`.
pub fn encode_chunk(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

async fn stream_audio(mut socket: WebSocket, state: AppState) {
    let chunk_samples = state.config.chunk_samples(state.sample_rate);
    let metadata = serde_json::json!({
        "type": "metadata",
        "sample_rate": state.sample_rate,
        "channels": 1,
        "format": "f32le",
        "chunk_samples": chunk_samples,
        "chunk_ms": state.config.stream_chunk_ms,
    });
    if socket
        .send(Message::Text(metadata.to_string().into()))
        .await
        .is_err()
    {
        return;
    }
    info!(chunk_samples, "stream client connected");

    let mut ticker = tokio::time::interval(state.config.stream_chunk());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buffer = vec![0.0f32; chunk_samples];
    let mut sent_chunks = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let produced = state.playback().fill(&state.worker, &mut buffer);
                if produced == 0 {
                    continue;
                }
                state.metrics.synth.record_streamed(produced);
                if socket.send(Message::Binary(encode_chunk(&buffer).into())).await.is_err() {
                    break;
                }
                sent_chunks += 1;
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(sent_chunks, "stream client disconnected");
}
