//! # Sample-Rate Conversion
//!
//! Integer-ratio resampling between the fixed 8 kHz telephony rate and the
//! upstream session's target rate (16 kHz or 24 kHz).
//!
//! ## Strategies:
//! The two supported ratios have historically used different strategies, and
//! they are kept as separate per-ratio defaults rather than unified:
//!
//! | Ratio | Upsample           | Downsample       |
//! |-------|--------------------|------------------|
//! | 2     | linear interpolate | average pairs    |
//! | 3     | hold (repeat)      | decimate         |
//!
//! Either default can be overridden through configuration.

use serde::{Deserialize, Serialize};

/// Telephony sample rate. Fixed by the media transport.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Strategy used when raising 8 kHz audio to the target rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsampleMode {
    /// Pick the default for the ratio
    Auto,
    /// Interpolate linearly towards the next sample
    Linear,
    /// Repeat each sample `ratio` times
    Hold,
}

/// Strategy used when lowering target-rate audio to 8 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownsampleMode {
    /// Pick the default for the ratio
    Auto,
    /// Average each group of `ratio` samples
    Average,
    /// Keep the first sample of each group and discard the rest
    Decimate,
}

/// Resolved resampling policy for one target rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplePolicy {
    ratio: usize,
    up: UpsampleMode,
    down: DownsampleMode,
}

impl ResamplePolicy {
    /// Build the policy for an integer ratio, resolving `Auto` overrides to
    /// the per-ratio defaults.
    pub fn for_ratio(ratio: usize, up: UpsampleMode, down: DownsampleMode) -> Self {
        let up = match up {
            UpsampleMode::Auto if ratio == 2 => UpsampleMode::Linear,
            UpsampleMode::Auto => UpsampleMode::Hold,
            explicit => explicit,
        };
        let down = match down {
            DownsampleMode::Auto if ratio == 2 => DownsampleMode::Average,
            DownsampleMode::Auto => DownsampleMode::Decimate,
            explicit => explicit,
        };

        Self { ratio, up, down }
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    pub fn upsample_mode(&self) -> UpsampleMode {
        self.up
    }

    pub fn downsample_mode(&self) -> DownsampleMode {
        self.down
    }

    /// Raise 8 kHz samples to the target rate. Produces `ratio * N` samples.
    ///
    /// With linear interpolation the sample after the last one is taken to be
    /// the last one itself, so the tail of the frame is flat.
    pub fn resample_up(&self, samples: &[i16]) -> Vec<i16> {
        let ratio = self.ratio;
        let mut output = Vec::with_capacity(samples.len() * ratio);

        for (index, &current) in samples.iter().enumerate() {
            let next = samples.get(index + 1).copied().unwrap_or(current);
            output.push(current);

            for step in 1..ratio {
                let sample = match self.up {
                    UpsampleMode::Linear => {
                        let weighted = current as i64 * (ratio - step) as i64 + next as i64 * step as i64;
                        round_half_up(weighted, ratio as i64)
                    }
                    _ => current,
                };
                output.push(sample);
            }
        }

        output
    }

    /// Lower target-rate samples to 8 kHz. Produces `⌊N / ratio⌋` samples;
    /// an incomplete trailing group is discarded.
    pub fn resample_down(&self, samples: &[i16]) -> Vec<i16> {
        samples
            .chunks_exact(self.ratio)
            .map(|group| match self.down {
                DownsampleMode::Average => {
                    let sum: i64 = group.iter().map(|&s| s as i64).sum();
                    round_half_up(sum, group.len() as i64)
                }
                _ => group[0],
            })
            .collect()
    }
}

/// Divide with rounding half towards positive infinity, then clamp to i16.
fn round_half_up(numerator: i64, denominator: i64) -> i16 {
    let rounded = (numerator * 2 + denominator).div_euclid(denominator * 2);
    rounded.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}
