//! DSP Engine — Pure Rust bytebeat playback.
//!
//! All synthesis runs in Rust for deterministic, cross-platform audio output.
//! The same code powers both the WebAudio path (AudioWorklet + WASM) and the
//! offline WAV renderer.

pub mod clock;
pub mod encoder;
pub mod engine;
pub mod meter;
pub mod renderer;
pub mod supervisor;
