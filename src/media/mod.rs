//! PCM helpers shared by the RTP path and the AI clients: 8k<->16k
//! resampling, RMS energy, and WAV container encoding for ASR upload.
//! All PCM is 16-bit little-endian mono unless stated otherwise.

use std::io::Cursor;

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};

/// 20ms at 8kHz/16-bit/mono.
pub const FRAME_BYTES_8K: usize = 320;
/// 20ms of μ-law payload at 8kHz.
pub const ULAW_CHUNK_BYTES: usize = 160;

pub fn bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Linear-interpolation upsample 8kHz -> 16kHz (doubles the sample count).
pub fn upsample_8k_to_16k(pcm8k: &[u8]) -> Vec<u8> {
    let samples = bytes_to_samples(pcm8k);
    let mut out = Vec::with_capacity(samples.len() * 2);
    for (i, &s) in samples.iter().enumerate() {
        out.push(s);
        let next = samples.get(i + 1).copied().unwrap_or(s);
        out.push(((s as i32 + next as i32) / 2) as i16);
    }
    samples_to_bytes(&out)
}

/// Pair-averaging downsample 16kHz -> 8kHz (halves the sample count).
pub fn downsample_16k_to_8k(pcm16k: &[u8]) -> Vec<u8> {
    let samples = bytes_to_samples(pcm16k);
    let mut out = Vec::with_capacity(samples.len() / 2);
    for pair in samples.chunks_exact(2) {
        out.push(((pair[0] as i32 + pair[1] as i32) / 2) as i16);
    }
    samples_to_bytes(&out)
}

/// Root-mean-square energy of a PCM16 frame.
pub fn rms(pcm: &[u8]) -> f64 {
    let samples = bytes_to_samples(pcm);
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Wraps raw PCM16 into an in-memory WAV container for the ASR upload.
pub fn pcm_to_wav_bytes(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for s in bytes_to_samples(pcm) {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Reads a WAV body (the TTS response) back into raw PCM16 samples plus rate.
pub fn wav_bytes_to_pcm(wav: &[u8]) -> Result<(Vec<u8>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))?;
    let rate = reader.spec().sample_rate;
    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    Ok((samples_to_bytes(&samples?), rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsample_doubles_length() {
        let frame = vec![0u8; FRAME_BYTES_8K];
        assert_eq!(upsample_8k_to_16k(&frame).len(), FRAME_BYTES_8K * 2);
    }

    #[test]
    fn downsample_halves_length() {
        let pcm = samples_to_bytes(&[100i16; 640]);
        assert_eq!(downsample_16k_to_8k(&pcm).len(), 640);
    }

    #[test]
    fn down_then_up_preserves_dc_level() {
        let pcm = samples_to_bytes(&[1000i16; 320]);
        let down = downsample_16k_to_8k(&pcm);
        let up = upsample_8k_to_16k(&down);
        for s in bytes_to_samples(&up) {
            assert_eq!(s, 1000);
        }
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&vec![0u8; 640]), 0.0);
    }

    #[test]
    fn rms_of_constant_signal() {
        let pcm = samples_to_bytes(&[2000i16; 160]);
        assert!((rms(&pcm) - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn wav_round_trip() {
        let pcm = samples_to_bytes(&[-5i16, 0, 5, 1000, -1000]);
        let wav = pcm_to_wav_bytes(&pcm, 16_000).unwrap();
        let (back, rate) = wav_bytes_to_pcm(&wav).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(back, pcm);
    }
}
