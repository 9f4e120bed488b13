use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use crate::media::{self, ULAW_CHUNK_BYTES};
use crate::rtp::builder::build_rtp_packet;
use crate::rtp::codec::encode_mulaw;
use crate::rtp::packet::RtpPacket;
use crate::rtp::stream::RtpStreamState;
use crate::rtp::{PT_PCMU, TS_INCREMENT_20MS};

/// Sends reply audio (PCM16@16k) to `dst` as PCMU RTP, one 20ms packet
/// every 20ms of wall clock. Sending faster would overrun the remote
/// jitter buffer.
///
/// The stream state lock is held for the entire invocation, so overlapping
/// playbacks for the same call serialize instead of interleaving sequence
/// numbers. Seq/ts pick up where the previous send left off; only a call
/// boundary resets them.
///
/// `socket` should be the receiver's socket for source-port symmetry; a
/// throwaway socket is bound when none is supplied. `stop` is checked
/// between packets, so a cancelled playback ends promptly without sending
/// trailing audio.
///
/// Returns the number of packets sent. A transmit error aborts the
/// remaining chunks but keeps the state advanced up to the failure point.
pub async fn send_pcm16k(
    pcm16k: &[u8],
    dst: SocketAddr,
    socket: Option<Arc<UdpSocket>>,
    stream: &Mutex<RtpStreamState>,
    stop: &AtomicBool,
) -> Result<usize> {
    if pcm16k.is_empty() {
        return Ok(0);
    }

    let pcm8k = media::downsample_16k_to_8k(pcm16k);
    let ulaw = encode_mulaw(&pcm8k);
    debug!("[rtp tx] dst={} bytes_ulaw={}", dst, ulaw.len());

    let socket = match socket {
        Some(s) => s,
        None => Arc::new(UdpSocket::bind("0.0.0.0:0").await?),
    };

    let mut state = stream.lock().await;
    state.ensure_initialized();

    let mut pacing = interval(std::time::Duration::from_millis(20));
    pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sent = 0usize;
    let mut first = true;

    // Trailing partial chunks are dropped; only full 20ms packets go out.
    for chunk in ulaw.chunks_exact(ULAW_CHUNK_BYTES) {
        if stop.load(Ordering::SeqCst) {
            info!("[rtp tx] cancelled after {} packets", sent);
            break;
        }
        pacing.tick().await;

        let mut pkt = RtpPacket::new(
            PT_PCMU,
            state.sequence_number,
            state.timestamp,
            state.ssrc,
            chunk.to_vec(),
        );
        pkt.marker = first;

        if let Err(e) = socket.send_to(&build_rtp_packet(&pkt), dst).await {
            warn!("[rtp tx] send error after {} packets: {:?}", sent, e);
            break;
        }
        first = false;
        sent += 1;
        state.advance(TS_INCREMENT_20MS);
    }

    info!("[rtp tx] sent {} RTP packets to {}", sent, dst);
    Ok(sent)
}
