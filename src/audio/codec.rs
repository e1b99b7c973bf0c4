//! # Mu-law Codec
//!
//! Converts between 8-bit mu-law telephony audio and 16-bit linear PCM.
//! Telephony media streams carry 8 kHz mono mu-law, one byte per sample.
//!
//! ## Key Functions:
//! - **decode_telephony_frame**: mu-law bytes → linear samples (8 kHz)
//! - **encode_to_telephony_frame**: linear samples (8 kHz) → mu-law bytes
//! - **pcm_bytes_to_samples / samples_to_pcm_bytes**: 16-bit little-endian wire format
//!
//! ## Wire Convention:
//! Every mu-law byte is stored complemented. A decoded byte is laid out as
//! `sign (1 bit) | exponent (3 bits) | mantissa (4 bits)`.

use crate::error::RelayError;
use byteorder::{ByteOrder, LittleEndian};

/// Offset added to the mantissa when reconstructing a mu-law sample.
pub const MULAW_BIAS: i32 = 33;

/// Largest magnitude the encoder represents.
pub const MULAW_CLIP: i32 = 32767;

/// Lowest segment boundary. Magnitudes below it share segment 0.
const SEGMENT_FLOOR: i32 = 0x80;

/// Highest segment boundary (exponent 7).
const SEGMENT_CEILING: i32 = 0x4000;

/// Decode a single mu-law byte into a linear sample.
///
/// ## Steps:
/// 1. Complement all bits (undo the wire convention)
/// 2. Split into sign, exponent and mantissa
/// 3. Rebuild the magnitude as `((mantissa << 1) + 33) << (exponent + 2)`
///
/// The largest magnitude this produces is `63 << 9 = 32256`, so the result
/// always fits an `i16`.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let negative = byte & 0x80 != 0;
    let exponent = ((byte >> 4) & 0x07) as i32;
    let mantissa = (byte & 0x0F) as i32;

    let magnitude = ((mantissa << 1) + MULAW_BIAS) << (exponent + 2);

    if negative {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a single linear sample into a mu-law byte.
///
/// ## Steps:
/// 1. Take the absolute value, clamped to 32767
/// 2. Walk the segment boundaries from 0x4000 down to 0x80 and stop at the
///    first one not exceeding the magnitude; that position is the exponent
/// 3. The mantissa is the position inside the segment in steps of
///    `1 << (exponent + 3)`
/// 4. Pack and complement
///
/// The decoder reconstructs `(mantissa + 16.5) << (exponent + 3)`, the
/// midpoint of the step the magnitude fell into.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };
    let magnitude = (sample as i32).abs().min(MULAW_CLIP);

    let mut exponent: i32 = 7;
    let mut boundary = SEGMENT_CEILING;
    while boundary > SEGMENT_FLOOR && magnitude < boundary {
        boundary >>= 1;
        exponent -= 1;
    }

    let mantissa = if magnitude < SEGMENT_FLOOR {
        0
    } else {
        ((magnitude >> (exponent + 3)) - 16).clamp(0, 15)
    };

    !(sign | ((exponent as u8) << 4) | mantissa as u8)
}

/// Decode a telephony frame (mu-law, 8 kHz) into linear samples at 8 kHz.
pub fn decode_telephony_frame(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&byte| mulaw_to_linear(byte)).collect()
}

/// Encode linear samples at 8 kHz into a telephony frame (mu-law).
pub fn encode_to_telephony_frame(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&sample| linear_to_mulaw(sample)).collect()
}

/// Parse 16-bit little-endian PCM bytes into samples.
///
/// ## Errors:
/// An odd byte count cannot be split into whole samples and is rejected
/// with `RelayError::OddPcmLength`.
pub fn pcm_bytes_to_samples(data: &[u8]) -> Result<Vec<i16>, RelayError> {
    if data.len() % 2 != 0 {
        return Err(RelayError::OddPcmLength(data.len()));
    }

    let mut samples = vec![0i16; data.len() / 2];
    LittleEndian::read_i16_into(data, &mut samples);
    Ok(samples)
}

/// Serialize samples as 16-bit little-endian PCM bytes.
pub fn samples_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut data = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut data);
    data
}
