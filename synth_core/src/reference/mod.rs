//! Self-contained engine and vocoder implementations.
//!
//! They stand in for a trained acoustic model and a mel-cepstral vocoder:
//! statistics are derived deterministically from the label query, so the
//! whole pipeline can run, be tested and be listened to without model files.

mod engine;
mod vocoder;

pub use engine::ReferenceEngine;
pub use vocoder::PulseVocoder;
