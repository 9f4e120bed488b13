//! μ-law (G.711 PCMU) transcoding. The bridge runs a single fixed
//! narrowband codec; there is no negotiation.

pub fn mulaw_to_linear16(mu: u8) -> i16 {
    const BIAS: i32 = 0x84;
    let mu = !mu;
    let sign = (mu & 0x80) != 0;
    let segment = (mu & 0x70) >> 4;
    let mantissa = (mu & 0x0F) as i32;

    // The bias is folded in before the segment shift and removed after,
    // so code 0xFF (positive zero) decodes to exactly 0.
    let value = (((mantissa << 3) + BIAS) << segment) - BIAS;
    (if sign { -value } else { value }) as i16
}

pub fn linear16_to_mulaw(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    // Clamp so pcm + BIAS stays within 15 bits; otherwise full-scale
    // samples lose their top bit and encode as near-zero.
    const CLIP: i32 = 0x7FFF - BIAS;

    // Widen before negating; -i16::MIN does not fit in i16.
    let mut pcm = i32::from(sample);
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    if pcm > CLIP {
        pcm = CLIP;
    }
    pcm += BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (pcm & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((pcm >> (exponent + 3)) & 0x0F) as u8;
    !(sign | ((exponent as u8) << 4) | mantissa)
}

/// Decodes a μ-law payload into little-endian PCM16 bytes.
pub fn decode_mulaw(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() * 2);
    for &b in payload {
        out.extend_from_slice(&mulaw_to_linear16(b).to_le_bytes());
    }
    out
}

/// Encodes little-endian PCM16 bytes into μ-law.
pub fn encode_mulaw(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(2)
        .map(|c| linear16_to_mulaw(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_codes_decode_to_zero() {
        // G.711: 0xFF is positive zero, 0x7F is negative zero.
        assert_eq!(mulaw_to_linear16(0xFF), 0);
        assert_eq!(mulaw_to_linear16(0x7F), 0);
    }

    #[test]
    fn segment_endpoints_decode_exactly() {
        // Largest code: mantissa 15, segment 7 -> ((120+132)<<7)-132.
        assert_eq!(mulaw_to_linear16(0x80), 32124);
        assert_eq!(mulaw_to_linear16(0x00), -32124);
    }

    #[test]
    fn silence_round_trips_near_zero() {
        let mu = linear16_to_mulaw(0);
        let back = mulaw_to_linear16(mu);
        assert!(back.abs() <= 8, "decoded silence {} too far from zero", back);
    }

    #[test]
    fn encode_is_monotonic_in_magnitude() {
        // Louder input must not decode quieter after a round trip.
        let quiet = mulaw_to_linear16(linear16_to_mulaw(500)).abs();
        let loud = mulaw_to_linear16(linear16_to_mulaw(20_000)).abs();
        assert!(loud > quiet);
    }

    #[test]
    fn decode_doubles_length() {
        assert_eq!(decode_mulaw(&[0xffu8; 160]).len(), 320);
    }

    #[test]
    fn round_trip_error_is_bounded() {
        for &s in &[i16::MIN, -30000, -1000, -100, 0, 100, 1000, 30000, i16::MAX] {
            let back = mulaw_to_linear16(linear16_to_mulaw(s));
            let err = (s as i32 - back as i32).abs();
            // μ-law quantization error grows with magnitude; 1/16 of the
            // segment span is a safe envelope.
            assert!(err <= (s.unsigned_abs() as i32 / 8).max(16), "s={} back={}", s, back);
        }
    }
}
