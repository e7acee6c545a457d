//! Text-safe wire representation of PCM audio.
//!
//! - Outbound: f32 samples → clamp → PCM16 little-endian → base64
//! - Inbound: base64 → PCM16 little-endian → de-interleaved f32 channels

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

pub use base64::DecodeError;

/// Encode raw bytes as standard (padded) base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text produced by [`encode`] (or by the remote service).
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD.decode(text)
}

/// Convert float samples to interleaved PCM16 little-endian bytes.
///
/// Samples are clamped to [-1.0, 1.0] first, so hot input saturates instead of
/// wrapping around.
pub fn samples_to_wire(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        // `as` truncates toward zero and maps NaN to 0
        let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Convert interleaved PCM16 little-endian bytes into one f32 buffer per channel.
///
/// Sample `i` of channel `c` is read from flat index `i * channels + c`.
/// A trailing odd byte or partial frame is ignored.
pub fn wire_to_samples(bytes: &[u8], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let pcm: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let frame_count = pcm.len() / channels;

    (0..channels)
        .map(|ch| {
            (0..frame_count)
                .map(|i| f32::from(pcm[i * channels + ch]) / 32768.0)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip_including_empty() {
        let inputs: [&[u8]; 4] = [b"", b"\x00", b"\xff\x00\x7f\x80", b"hello relay"];
        for input in inputs {
            assert_eq!(decode(&encode(input)).unwrap(), input);
        }
        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode(&encode(&all)).unwrap(), all);
    }

    #[test]
    fn out_of_range_samples_saturate() {
        assert_eq!(samples_to_wire(&[2.0]), samples_to_wire(&[1.0]));
        assert_eq!(samples_to_wire(&[-2.0]), samples_to_wire(&[-1.0]));
        assert_eq!(samples_to_wire(&[1.0]), 32767i16.to_le_bytes());
        assert_eq!(samples_to_wire(&[-1.0]), (-32767i16).to_le_bytes());
    }

    #[test]
    fn scaling_truncates_toward_zero() {
        // 0.5 * 32767 = 16383.5
        assert_eq!(samples_to_wire(&[0.5]), 16383i16.to_le_bytes());
        assert_eq!(samples_to_wire(&[-0.5]), (-16383i16).to_le_bytes());
        assert_eq!(samples_to_wire(&[0.0]), [0, 0]);
    }

    #[test]
    fn stereo_is_deinterleaved() {
        let mut bytes = Vec::new();
        for v in [100i16, -100, 200, -200, 300, -300] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let channels = wire_to_samples(&bytes, 2);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0], vec![100.0 / 32768.0, 200.0 / 32768.0, 300.0 / 32768.0]);
        assert_eq!(channels[1], vec![-100.0 / 32768.0, -200.0 / 32768.0, -300.0 / 32768.0]);
    }

    #[test]
    fn trailing_partial_data_is_ignored() {
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0x12];
        let mono = wire_to_samples(&bytes, 1);
        assert_eq!(mono[0], vec![0.5, -0.5]);

        let stereo = wire_to_samples(&bytes[..4], 2);
        assert_eq!(stereo[0], vec![0.5]);
        assert_eq!(stereo[1], vec![-0.5]);

        let partial = wire_to_samples(&bytes[..2], 2);
        assert!(partial[0].is_empty() && partial[1].is_empty());
    }
}
