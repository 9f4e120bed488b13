use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use ari_voicebridge::ai::{HttpAsrPort, HttpDialogPort, HttpTtsPort};
use ari_voicebridge::ari::{AriClient, AriEvent, EventFeed};
use ari_voicebridge::config::{self, Config};
use ari_voicebridge::logging;
use ari_voicebridge::rtp::rx::RtpReceiver;
use ari_voicebridge::segment::Segmenter;
use ari_voicebridge::session::CallController;

/// Event dispatch loop: multiplexes the ARI event feed with completed
/// utterances from the media pipeline. One utterance per iteration keeps
/// the loop responsive to control events; collaborator failures only cost
/// the current turn.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cfg = Config::from_env()?;
    let seg_cfg = config::segmenter_config().clone();

    // The receiver (and its segmenter) lives for the whole process; calls
    // come and go around it.
    let segmenter = Arc::new(StdMutex::new(Segmenter::new(seg_cfg.clone())));
    let (segment_tx, mut segment_rx) = unbounded_channel::<Vec<u8>>();
    let bind: SocketAddr = format!("{}:{}", cfg.media_ip, cfg.media_port).parse()?;
    let mut receiver = RtpReceiver::start(bind, segmenter.clone(), segment_tx).await?;

    let ari = AriClient::new(&cfg)?;
    let asr = Arc::new(HttpAsrPort::new(cfg.asr_url.clone())?);
    let dialog = Arc::new(HttpDialogPort::new(cfg.dialog_url.clone())?);
    let tts = Arc::new(HttpTtsPort::new(cfg.tts_url.clone())?);

    let mut controller = CallController::new(
        &cfg,
        Arc::new(ari.clone()),
        asr,
        dialog,
        tts,
        segmenter,
        receiver.socket(),
        seg_cfg.min_dispatch_bytes,
    );

    let mut feed = EventFeed::connect(&ari.events_url()).await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(err) = res {
                    log::warn!("[main] shutdown signal error: {:?}", err);
                }
                log::info!("[main] shutting down");
                break;
            }
            ev = feed.next_event() => {
                match ev {
                    Some(ev) => {
                        dispatch_event(&mut controller, &cfg, ev, &mut segment_rx).await;
                    }
                    None => {
                        // Feed gone means no more call control; stop.
                        log::error!("[main] event feed ended");
                        break;
                    }
                }
            }
            Some(utterance) = segment_rx.recv(), if controller.is_active() => {
                controller.on_utterance(utterance).await;
            }
        }
    }

    receiver.stop();
    Ok(())
}

async fn dispatch_event(
    controller: &mut CallController,
    cfg: &Config,
    ev: AriEvent,
    segment_rx: &mut UnboundedReceiver<Vec<u8>>,
) {
    match ev.kind.as_str() {
        "StasisStart" => {
            if ev.application.as_deref() == Some(cfg.ari_app.as_str()) {
                controller.on_call_start(&ev).await;
            }
        }
        "ChannelHangupRequest" | "ChannelDestroyed" | "StasisEnd" => {
            if let Some(channel_id) = ev.channel_id() {
                let channel_id = channel_id.to_string();
                controller.on_call_end(&channel_id, segment_rx).await;
            }
        }
        _ => {}
    }
}
