//! Call session controller: the state machine driving one call from
//! StasisStart through the utterance -> recognize -> respond -> synthesize
//! -> send cycle to teardown. At most one live session exists; media
//! operations without one are no-ops.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ai::{AsrPort, DialogPort, TtsPort};
use crate::ari::events::{is_caller_event, AriEvent};
use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::rtp::stream::RtpStreamState;
use crate::rtp::tx::send_pcm16k;
use crate::segment::Segmenter;

pub mod port;

pub use port::{ControlFuture, ControlPort};

const UNICAST_ADDRESS_VAR: &str = "UNICASTRTP_LOCAL_ADDRESS";
const UNICAST_PORT_VAR: &str = "UNICASTRTP_LOCAL_PORT";

/// Asterisk answers an outbound leg noticeably later than it raises
/// StasisStart; an operator-supplied opening line waits this long.
const DIAL_GREETING_DELAY: Duration = Duration::from_secs(3);
/// Settle time before the default welcome on an inbound call.
const WELCOME_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Establishing,
    Active,
}

/// State of the one live call.
pub struct CallSession {
    pub caller_id: String,
    pub bridge_id: String,
    pub ext_id: String,
    pub caller_number: String,
    pub rtp_dst: SocketAddr,
    /// Cooperative cancel shared by every playback task of this call.
    cancel: Arc<AtomicBool>,
    playback: Option<JoinHandle<()>>,
}

pub struct CallController {
    control: Arc<dyn ControlPort>,
    asr: Arc<dyn AsrPort>,
    dialog: Arc<dyn DialogPort>,
    tts: Arc<dyn TtsPort>,
    segmenter: Arc<StdMutex<Segmenter>>,
    send_socket: Arc<UdpSocket>,
    stream: Arc<Mutex<RtpStreamState>>,
    media_host: String,
    lang: String,
    welcome: String,
    min_dispatch_bytes: usize,
    state: SessionState,
    session: Option<CallSession>,
}

impl CallController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &Config,
        control: Arc<dyn ControlPort>,
        asr: Arc<dyn AsrPort>,
        dialog: Arc<dyn DialogPort>,
        tts: Arc<dyn TtsPort>,
        segmenter: Arc<StdMutex<Segmenter>>,
        send_socket: Arc<UdpSocket>,
        min_dispatch_bytes: usize,
    ) -> Self {
        Self {
            control,
            asr,
            dialog,
            tts,
            segmenter,
            send_socket,
            stream: Arc::new(Mutex::new(RtpStreamState::new())),
            media_host: format!("{}:{}", cfg.media_ip, cfg.media_port),
            lang: cfg.lang.clone(),
            welcome: cfg.welcome.clone(),
            min_dispatch_bytes,
            state: SessionState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// StasisStart: establish bridge + external media and greet.
    pub async fn on_call_start(&mut self, ev: &AriEvent) {
        if !is_caller_event(ev) {
            debug!("[session] ignoring StasisStart for non-telephony channel");
            return;
        }
        let Some(caller_id) = ev.channel_id().map(str::to_string) else {
            return;
        };
        if self.session.is_some() {
            // One call at a time by construction; a second caller would
            // otherwise silently overwrite live state.
            warn!(
                "[session] StasisStart for {} while a call is in progress, ignoring",
                caller_id
            );
            return;
        }

        let caller_number = ev
            .caller_number()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            "[session] caller in: chan={}, number={}",
            caller_id, caller_number
        );

        self.state = SessionState::Establishing;
        match self.establish(&caller_id, &caller_number).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = SessionState::Active;
                info!("[session] call active, RTP already running");
                self.greet(ev).await;
            }
            Err(e) => {
                warn!("[session] call setup failed: {:?}", e);
                self.state = SessionState::Idle;
            }
        }
    }

    async fn establish(&mut self, caller_id: &str, caller_number: &str) -> Result<CallSession> {
        let bridge_id = self.control.create_mixing_bridge().await?;

        let setup = async {
            let add_policy = RetryPolicy::bridge_add();
            add_policy
                .run(|| {
                    self.control
                        .add_channel_to_bridge(bridge_id.clone(), caller_id.to_string())
                })
                .await?;

            let ext_id = self
                .control
                .create_external_media(self.media_host.clone())
                .await?;

            // The leg is created asynchronously; poll until it answers.
            let poll_policy = RetryPolicy::channel_poll();
            poll_policy
                .run(|| {
                    let fut = self.control.channel_exists(ext_id.clone());
                    async move {
                        match fut.await {
                            Ok(true) => Ok(()),
                            Ok(false) => Err(anyhow!("channel not yet queryable")),
                            Err(e) => Err(e),
                        }
                    }
                })
                .await?;

            add_policy
                .run(|| {
                    self.control
                        .add_channel_to_bridge(bridge_id.clone(), ext_id.clone())
                })
                .await?;

            let rtp_dst = self.read_remote_endpoint(&ext_id).await?;
            info!("[session] reply target set {}", rtp_dst);
            Ok::<_, anyhow::Error>((ext_id, rtp_dst))
        };

        match setup.await {
            Ok((ext_id, rtp_dst)) => {
                // New call boundary: fresh SSRC and random seq/ts.
                self.stream.lock().await.reset();
                Ok(CallSession {
                    caller_id: caller_id.to_string(),
                    bridge_id,
                    ext_id,
                    caller_number: caller_number.to_string(),
                    rtp_dst,
                    cancel: Arc::new(AtomicBool::new(false)),
                    playback: None,
                })
            }
            Err(e) => {
                if let Err(del) = self.control.delete_bridge(bridge_id.clone()).await {
                    debug!("[session] bridge cleanup after failed setup: {:?}", del);
                }
                Err(e)
            }
        }
    }

    /// Remote RTP endpoint Asterisk assigned to the external-media leg.
    async fn read_remote_endpoint(&self, ext_id: &str) -> Result<SocketAddr> {
        let ip = self
            .control
            .get_channel_var(ext_id.to_string(), UNICAST_ADDRESS_VAR.to_string())
            .await?
            .ok_or_else(|| anyhow!("{} not set", UNICAST_ADDRESS_VAR))?;
        let port = self
            .control
            .get_channel_var(ext_id.to_string(), UNICAST_PORT_VAR.to_string())
            .await?
            .ok_or_else(|| anyhow!("{} not set", UNICAST_PORT_VAR))?;
        Ok(format!("{}:{}", ip, port).parse()?)
    }

    async fn greet(&mut self, ev: &AriEvent) {
        let opening = ev
            .args
            .first()
            .map(|a| urlencoding::decode(a).map(|s| s.into_owned()).unwrap_or_default())
            .unwrap_or_default();
        let opening = opening.trim().to_string();
        if !opening.is_empty() {
            self.play(opening, DIAL_GREETING_DELAY);
        } else {
            self.play(self.welcome.clone(), WELCOME_DELAY);
        }
    }

    /// One completed utterance: ASR -> dialog -> TTS -> paced RTP.
    pub async fn on_utterance(&mut self, utterance: Vec<u8>) {
        if self.state != SessionState::Active || self.session.is_none() {
            debug!("[session] utterance without live call, dropped");
            return;
        }
        if utterance.len() < self.min_dispatch_bytes {
            debug!(
                "[session] utterance below dispatch minimum ({} bytes), dropped",
                utterance.len()
            );
            return;
        }

        let caller_number = self
            .session
            .as_ref()
            .map(|s| s.caller_number.clone())
            .unwrap_or_default();

        let t0 = std::time::Instant::now();
        let text_in = match self.asr.transcribe(utterance, self.lang.clone()).await {
            Ok(t) => t,
            Err(e) => {
                warn!("[session] asr failed, skipping turn: {:?}", e);
                return;
            }
        };
        info!(
            "[session] stt done in {}ms text_in={:?}",
            t0.elapsed().as_millis(),
            text_in
        );
        if text_in.is_empty() {
            return;
        }

        info!("[asr][{}] {:?}", caller_number, text_in);
        let text_out = match self.dialog.process(text_in, caller_number).await {
            Ok(t) => t,
            Err(e) => {
                warn!("[session] dialog processor failed, skipping turn: {:?}", e);
                return;
            }
        };
        if text_out.is_empty() {
            return;
        }
        info!("[agent] {:?}", text_out);

        self.ensure_ext_in_bridge().await;
        self.play(text_out, Duration::ZERO);
    }

    /// The control plane has been seen silently evicting the
    /// external-media leg; without a re-add the reply would vanish.
    async fn ensure_ext_in_bridge(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match self
            .control
            .bridge_has_channel(session.bridge_id.clone(), session.ext_id.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!("[session] external media missing from bridge, re-adding");
                if let Err(e) = self
                    .control
                    .add_channel_to_bridge(session.bridge_id.clone(), session.ext_id.clone())
                    .await
                {
                    warn!("[session] re-add failed: {:?}", e);
                }
            }
            Err(e) => {
                warn!("[session] bridge membership check failed: {:?}", e);
            }
        }
    }

    /// Spawns a playback task: wait, synthesize, send. The outbound
    /// stream mutex serializes overlapping playbacks; the session cancel
    /// flag stops them at teardown.
    fn play(&mut self, text: String, delay: Duration) {
        let Some(session) = self.session.as_mut() else {
            warn!("[session] playback requested without live call");
            return;
        };

        let tts = self.tts.clone();
        let socket = self.send_socket.clone();
        let stream = self.stream.clone();
        let stop = session.cancel.clone();
        let dst = session.rtp_dst;

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if stop.load(Ordering::SeqCst) {
                debug!("[tts] cancelled before synth");
                return;
            }
            let pcm = match tts.synthesize(text).await {
                Ok(pcm) => pcm,
                Err(e) => {
                    warn!("[tts] synthesis failed: {:?}", e);
                    return;
                }
            };
            if pcm.is_empty() {
                warn!("[tts] no audio from synthesizer");
                return;
            }
            if stop.load(Ordering::SeqCst) {
                debug!("[tts] cancelled before send");
                return;
            }
            if let Err(e) = send_pcm16k(&pcm, dst, Some(socket), &stream, &stop).await {
                warn!("[tts] playback failed: {:?}", e);
            }
        });
        session.playback = Some(handle);
    }

    /// Hangup/destroy/StasisEnd for the current caller: tear everything
    /// down. Events for unrelated channels are ignored.
    pub async fn on_call_end(
        &mut self,
        channel_id: &str,
        queue: &mut UnboundedReceiver<Vec<u8>>,
    ) {
        match self.session.as_ref() {
            None => {
                debug!("[session] call-end without live call, ignoring");
                return;
            }
            Some(s) if s.caller_id != channel_id => {
                debug!(
                    "[session] call-end for unrelated channel {}, ignoring",
                    channel_id
                );
                return;
            }
            Some(_) => {}
        }
        info!("[session] caller hung up/destroyed");

        let Some(mut session) = self.session.take() else {
            return;
        };
        self.state = SessionState::Idle;

        // Stop in-flight playback before the socket target goes stale.
        session.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = session.playback.take() {
            handle.abort();
            let _ = handle.await;
        }

        if let Err(e) = self.control.delete_bridge(session.bridge_id.clone()).await {
            debug!("[session] bridge delete failed: {:?}", e);
        }

        // A turn that finished in the hangup race still reaches the
        // dialog backend; there is no leg left to play a reply into.
        let residue = {
            let mut seg = self.segmenter.lock().unwrap();
            seg.flush()
        };
        if let Some(residue) = residue {
            if residue.len() >= self.min_dispatch_bytes {
                info!("[session] flushing {} bytes at teardown", residue.len());
                self.process_final_utterance(residue, &session.caller_number)
                    .await;
            }
        }

        // Anything older in the queue belongs to a call that no longer
        // exists.
        let mut drained = 0usize;
        while queue.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!("[session] drained {} stale utterances", drained);
        }

        info!("[session] cleaned up");
    }

    async fn process_final_utterance(&self, utterance: Vec<u8>, caller_number: &str) {
        let text_in = match self.asr.transcribe(utterance, self.lang.clone()).await {
            Ok(t) => t,
            Err(e) => {
                warn!("[session] final asr failed: {:?}", e);
                return;
            }
        };
        if text_in.is_empty() {
            return;
        }
        info!("[asr][{}] (final) {:?}", caller_number, text_in);
        match self
            .dialog
            .process(text_in, caller_number.to_string())
            .await
        {
            Ok(reply) => {
                if !reply.is_empty() {
                    debug!("[session] reply after hangup discarded: {:?}", reply);
                }
            }
            Err(e) => warn!("[session] final dialog call failed: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiFuture;
    use crate::config::{Config, SegmenterConfig};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::unbounded_channel;

    /// Control plane recorder: counts operations, succeeds everywhere.
    #[derive(Default)]
    struct RecordingControl {
        bridges_created: AtomicUsize,
        bridges_deleted: AtomicUsize,
    }

    impl ControlPort for RecordingControl {
        fn create_mixing_bridge(&self) -> ControlFuture<Result<String>> {
            self.bridges_created.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok("bridge-1".to_string()) })
        }
        fn add_channel_to_bridge(&self, _b: String, _c: String) -> ControlFuture<Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn create_external_media(&self, _h: String) -> ControlFuture<Result<String>> {
            Box::pin(async { Ok("ext-1".to_string()) })
        }
        fn channel_exists(&self, _c: String) -> ControlFuture<Result<bool>> {
            Box::pin(async { Ok(true) })
        }
        fn get_channel_var(&self, _c: String, var: String) -> ControlFuture<Result<Option<String>>> {
            Box::pin(async move {
                Ok(Some(match var.as_str() {
                    UNICAST_ADDRESS_VAR => "127.0.0.1".to_string(),
                    _ => "40000".to_string(),
                }))
            })
        }
        fn bridge_has_channel(&self, _b: String, _c: String) -> ControlFuture<Result<bool>> {
            Box::pin(async { Ok(true) })
        }
        fn delete_bridge(&self, _b: String) -> ControlFuture<Result<()>> {
            self.bridges_deleted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct NoopAsr;
    impl AsrPort for NoopAsr {
        fn transcribe(&self, _pcm: Vec<u8>, _lang: String) -> AiFuture<Result<String>> {
            Box::pin(async { Ok(String::new()) })
        }
    }

    struct NoopDialog;
    impl DialogPort for NoopDialog {
        fn process(&self, _t: String, _c: String) -> AiFuture<Result<String>> {
            Box::pin(async { Ok(String::new()) })
        }
    }

    struct NoopTts;
    impl TtsPort for NoopTts {
        fn synthesize(&self, _t: String) -> AiFuture<Result<Vec<u8>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn test_segmenter() -> Arc<StdMutex<Segmenter>> {
        Arc::new(StdMutex::new(Segmenter::new(SegmenterConfig {
            silence: Duration::from_millis(500),
            rms_threshold: 400.0,
            min_bytes: 24_000,
            min_dispatch_bytes: 32_000,
        })))
    }

    fn test_config() -> Config {
        Config {
            ari_base: "http://127.0.0.1:1/ari".to_string(),
            ari_user: "u".to_string(),
            ari_pass: "p".to_string(),
            ari_app: "voicebridge".to_string(),
            media_ip: "127.0.0.1".to_string(),
            media_port: 0,
            lang: "de".to_string(),
            welcome: "hallo".to_string(),
            asr_url: String::new(),
            dialog_url: String::new(),
            tts_url: String::new(),
            endpoint_template: "PJSIP/{number}".to_string(),
            dialer_bind: String::new(),
            dial_timeout_s: 45,
        }
    }

    async fn controller_with(control: Arc<RecordingControl>) -> CallController {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        CallController::new(
            &test_config(),
            control,
            Arc::new(NoopAsr),
            Arc::new(NoopDialog),
            Arc::new(NoopTts),
            test_segmenter(),
            socket,
            32_000,
        )
    }

    fn stasis_start(json: &str) -> AriEvent {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn non_telephony_start_creates_no_bridge() {
        let control = Arc::new(RecordingControl::default());
        let mut ctl = controller_with(control.clone()).await;
        let ev = stasis_start(
            r#"{"type":"StasisStart",
                "channel":{"id":"em1","name":"UnicastRTP/127.0.0.1:12000-0x0",
                           "channeltype":"UnicastRTP"}}"#,
        );
        ctl.on_call_start(&ev).await;
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(control.bridges_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn telephony_start_goes_active() {
        let control = Arc::new(RecordingControl::default());
        let mut ctl = controller_with(control.clone()).await;
        let ev = stasis_start(
            r#"{"type":"StasisStart",
                "channel":{"id":"c1","name":"PJSIP/1000-0001","channeltype":"PJSIP",
                           "caller":{"number":"1000"}}}"#,
        );
        ctl.on_call_start(&ev).await;
        assert!(ctl.is_active());
        assert_eq!(control.bridges_created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_call_start_is_rejected() {
        let control = Arc::new(RecordingControl::default());
        let mut ctl = controller_with(control.clone()).await;
        let first = stasis_start(
            r#"{"type":"StasisStart",
                "channel":{"id":"c1","channeltype":"PJSIP","caller":{"number":"1"}}}"#,
        );
        let second = stasis_start(
            r#"{"type":"StasisStart",
                "channel":{"id":"c2","channeltype":"PJSIP","caller":{"number":"2"}}}"#,
        );
        ctl.on_call_start(&first).await;
        ctl.on_call_start(&second).await;
        assert_eq!(control.bridges_created.load(Ordering::SeqCst), 1);
        assert!(ctl.is_active());
    }

    #[tokio::test]
    async fn hangup_for_unrelated_channel_is_ignored() {
        let control = Arc::new(RecordingControl::default());
        let mut ctl = controller_with(control.clone()).await;
        let ev = stasis_start(
            r#"{"type":"StasisStart",
                "channel":{"id":"c1","channeltype":"PJSIP","caller":{"number":"1"}}}"#,
        );
        ctl.on_call_start(&ev).await;

        let (_tx, mut rx) = unbounded_channel();
        ctl.on_call_end("someone-else", &mut rx).await;
        assert!(ctl.is_active());
        assert_eq!(control.bridges_deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hangup_for_caller_cleans_up() {
        let control = Arc::new(RecordingControl::default());
        let mut ctl = controller_with(control.clone()).await;
        let ev = stasis_start(
            r#"{"type":"StasisStart",
                "channel":{"id":"c1","channeltype":"PJSIP","caller":{"number":"1"}}}"#,
        );
        ctl.on_call_start(&ev).await;

        let (tx, mut rx) = unbounded_channel();
        tx.send(vec![0u8; 40_000]).unwrap(); // stale utterance to drain
        ctl.on_call_end("c1", &mut rx).await;
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(!ctl.is_active());
        assert_eq!(control.bridges_deleted.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());

        // The next caller may start a fresh session.
        ctl.on_call_start(&ev).await;
        assert!(ctl.is_active());
        assert_eq!(control.bridges_created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn utterance_without_session_is_noop() {
        let control = Arc::new(RecordingControl::default());
        let mut ctl = controller_with(control).await;
        ctl.on_utterance(vec![0u8; 64_000]).await;
        assert_eq!(ctl.state(), SessionState::Idle);
    }
}
