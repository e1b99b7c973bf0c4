//! # Audio Processing Module
//!
//! Pure, stateless audio conversion between the telephony side and the
//! upstream realtime session.
//!
//! ## Key Components:
//! - **Codec**: mu-law ↔ 16-bit linear PCM, plus PCM byte framing
//! - **Resampler**: integer-ratio rate conversion with per-ratio strategies
//! - **Transcoder**: both directions composed for a configured target rate
//!
//! ## Audio Formats:
//! - **Telephony**: 8 kHz, 8-bit mu-law, mono
//! - **Upstream**: 16 kHz or 24 kHz, 16-bit little-endian PCM, mono

pub mod codec;        // mu-law companding and PCM framing
pub mod resampler;    // 8 kHz ↔ target rate
pub mod transcoder;   // Composed conversions used by the relay
