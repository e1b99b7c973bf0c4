//! # Transcoder
//!
//! Composes the mu-law codec and the resampler into the two directions the
//! relay needs:
//! - **telephony → upstream**: mu-law 8 kHz → PCM16 LE at the target rate
//! - **upstream → telephony**: PCM16 LE at the target rate → mu-law 8 kHz
//!
//! A transcoder holds no audio state between frames; it only carries the
//! resolved resampling policy, so one instance can serve every frame of a pair.

use crate::audio::codec::{
    decode_telephony_frame, encode_to_telephony_frame, pcm_bytes_to_samples, samples_to_pcm_bytes,
};
use crate::audio::resampler::{DownsampleMode, ResamplePolicy, UpsampleMode, TELEPHONY_SAMPLE_RATE};
use crate::error::RelayError;

/// Sample rates the upstream session can be configured with.
pub const SUPPORTED_TARGET_RATES: [u32; 2] = [16000, 24000];

#[derive(Debug, Clone)]
pub struct Transcoder {
    target_rate: u32,
    policy: ResamplePolicy,
}

impl Transcoder {
    /// Create a transcoder for the given target rate.
    ///
    /// ## Errors:
    /// Returns `RelayError::UnsupportedSampleRate` unless the rate is one of
    /// `SUPPORTED_TARGET_RATES`.
    pub fn new(target_rate: u32, up: UpsampleMode, down: DownsampleMode) -> Result<Self, RelayError> {
        if !SUPPORTED_TARGET_RATES.contains(&target_rate) {
            return Err(RelayError::UnsupportedSampleRate(target_rate));
        }

        let ratio = (target_rate / TELEPHONY_SAMPLE_RATE) as usize;
        Ok(Self {
            target_rate,
            policy: ResamplePolicy::for_ratio(ratio, up, down),
        })
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn policy(&self) -> &ResamplePolicy {
        &self.policy
    }

    /// Convert one telephony payload into upstream PCM bytes.
    pub fn telephony_to_upstream(&self, mulaw: &[u8]) -> Vec<u8> {
        let narrowband = decode_telephony_frame(mulaw);
        let upsampled = self.policy.resample_up(&narrowband);
        samples_to_pcm_bytes(&upsampled)
    }

    /// Convert one upstream PCM payload into telephony mu-law bytes.
    pub fn upstream_to_telephony(&self, pcm: &[u8]) -> Result<Vec<u8>, RelayError> {
        let samples = pcm_bytes_to_samples(pcm)?;
        let narrowband = self.policy.resample_down(&samples);
        Ok(encode_to_telephony_frame(&narrowband))
    }
}
