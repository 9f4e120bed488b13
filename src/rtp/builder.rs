use crate::rtp::packet::RtpPacket;

/// Serializes a packet into the 12-byte fixed header + payload.
/// CSRC / extension emission is not supported (csrc_count is written as 0).
pub fn build_rtp_packet(pkt: &RtpPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + pkt.payload.len());

    let b0 = (pkt.version << 6)
        | ((pkt.padding as u8) << 5)
        | ((pkt.extension as u8) << 4);
    let b1 = ((pkt.marker as u8) << 7) | (pkt.payload_type & 0x7f);

    buf.push(b0);
    buf.push(b1);
    buf.extend_from_slice(&pkt.sequence_number.to_be_bytes());
    buf.extend_from_slice(&pkt.timestamp.to_be_bytes());
    buf.extend_from_slice(&pkt.ssrc.to_be_bytes());
    buf.extend_from_slice(&pkt.payload);
    buf
}
