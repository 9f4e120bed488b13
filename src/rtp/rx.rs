use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::media::{self, FRAME_BYTES_8K};
use crate::rtp::codec::decode_mulaw;
use crate::rtp::parser::{parse_rtp_packet, RtpParseError};
use crate::rtp::PT_PCMU;
use crate::segment::Segmenter;

/// Inbound media path: one UDP socket, bound once for the process
/// lifetime. Each datagram is parsed as RTP, μ-law decoded, chopped into
/// 20ms frames at 8kHz, upsampled to 16kHz and fed to the segmenter;
/// finished utterances go onto the segment queue.
///
/// The bound socket is exposed so the sender can transmit from the same
/// source port (many media endpoints expect symmetric RTP).
pub struct RtpReceiver {
    socket: Arc<UdpSocket>,
    handle: Option<JoinHandle<()>>,
}

impl RtpReceiver {
    /// Binds the media socket and spawns the receive task.
    pub async fn start(
        bind: SocketAddr,
        segmenter: Arc<Mutex<Segmenter>>,
        segment_tx: UnboundedSender<Vec<u8>>,
    ) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind).await?);
        info!("[rtp rx] listening on {} (PT=0 ulaw)", socket.local_addr()?);

        let sock = socket.clone();
        let handle = tokio::spawn(async move {
            run_rx(sock, segmenter, segment_tx).await;
        });

        Ok(Self {
            socket,
            handle: Some(handle),
        })
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Aborts the receive task at its next await point (in practice the
    /// pending `recv_from`); there is no graceful drain.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RtpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_rx(
    socket: Arc<UdpSocket>,
    segmenter: Arc<Mutex<Segmenter>>,
    segment_tx: UnboundedSender<Vec<u8>>,
) {
    let mut buf = vec![0u8; 2048];
    let mut pcm8k: Vec<u8> = Vec::new();

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                // Unrecoverable without a process restart; no reconnect.
                error!("[rtp rx] socket error, receive loop ends: {:?}", e);
                return;
            }
        };

        let pkt = match parse_rtp_packet(&buf[..len]) {
            Ok(pkt) => pkt,
            Err(RtpParseError::TooShort) => {
                debug!("[rtp rx] dropped short packet ({} bytes) from {}", len, src);
                continue;
            }
            Err(e) => {
                warn!("[rtp rx] dropped unparseable packet from {}: {}", src, e);
                continue;
            }
        };
        if pkt.payload_type != PT_PCMU {
            warn!(
                "[rtp rx] unsupported payload type {} from {}",
                pkt.payload_type, src
            );
            continue;
        }

        pcm8k.extend_from_slice(&decode_mulaw(&pkt.payload));

        while pcm8k.len() >= FRAME_BYTES_8K {
            let frame8k: Vec<u8> = pcm8k.drain(..FRAME_BYTES_8K).collect();
            let frame16k = media::upsample_8k_to_16k(&frame8k);
            let emitted = {
                let mut seg = segmenter.lock().unwrap();
                seg.feed(&frame16k)
            };
            if let Some(utterance) = emitted {
                debug!("[rtp rx] utterance complete: {} bytes", utterance.len());
                if segment_tx.send(utterance).is_err() {
                    warn!("[rtp rx] segment queue closed, receive loop ends");
                    return;
                }
            }
        }
    }
}
