//! Energy-threshold voice-activity segmentation. A continuous 20ms frame
//! stream becomes discrete utterances: frames accumulate into a buffer,
//! and once enough trailing silence has passed after speech (and the
//! buffer is large enough to be worth transcribing) the whole buffer is
//! emitted.
//!
//! Silence is measured with wall-clock deltas between successive feeds,
//! not nominal frame duration, so scheduling jitter on the receive path is
//! absorbed into the silence window. While no speech has been heard the
//! buffer is trimmed every time the silence window elapses, so idle line
//! noise neither accumulates nor produces silence-only utterances.

use std::time::{Duration, Instant};

use crate::config::SegmenterConfig;
use crate::media;

pub struct Segmenter {
    cfg: SegmenterConfig,
    buf: Vec<u8>,
    silent: Duration,
    voiced: bool,
    last_feed: Option<Instant>,
}

impl Segmenter {
    pub fn new(cfg: SegmenterConfig) -> Self {
        Self {
            cfg,
            buf: Vec::new(),
            silent: Duration::ZERO,
            voiced: false,
            last_feed: None,
        }
    }

    /// Feeds one PCM16@16k frame; returns a finished utterance if this
    /// frame crossed the trailing-silence threshold.
    pub fn feed(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        self.feed_at(frame, Instant::now())
    }

    /// Clock-parameterized variant of `feed` (the receive loop always
    /// passes `Instant::now()`; tests pass synthetic instants).
    pub fn feed_at(&mut self, frame: &[u8], now: Instant) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(frame);

        let dt = match self.last_feed {
            Some(prev) => now.saturating_duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_feed = Some(now);

        if media::rms(frame) >= self.cfg.rms_threshold {
            self.voiced = true;
            self.silent = Duration::ZERO;
        } else {
            self.silent += dt;
        }

        if self.silent >= self.cfg.silence {
            if self.voiced && self.buf.len() > self.cfg.min_bytes {
                self.silent = Duration::ZERO;
                self.voiced = false;
                return Some(std::mem::take(&mut self.buf));
            }
            if !self.voiced {
                // Idle line: nothing worth keeping before speech starts.
                self.buf.clear();
            }
        }
        None
    }

    /// Emits whatever is buffered, regardless of trailing silence. Called
    /// at call teardown so a just-finished utterance is not lost to the
    /// hangup race. Under-minimum residue is discarded.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.silent = Duration::ZERO;
        self.voiced = false;
        self.last_feed = None;
        let buf = std::mem::take(&mut self.buf);
        if buf.len() > self.cfg.min_bytes {
            Some(buf)
        } else {
            None
        }
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> SegmenterConfig {
        SegmenterConfig {
            silence: Duration::from_millis(500),
            rms_threshold: 400.0,
            min_bytes: 24_000,
            min_dispatch_bytes: 32_000,
        }
    }

    // 20ms at 16kHz, matching what the receive loop feeds: 320 samples.
    fn loud_frame() -> Vec<u8> {
        crate::media::samples_to_bytes(&[5000i16; 320])
    }

    fn silent_frame() -> Vec<u8> {
        vec![0u8; 640]
    }

    /// Feeds `n` frames at an exact 20ms cadence, collecting emissions.
    fn feed_frames(
        seg: &mut Segmenter,
        start: Instant,
        offset_ms: &mut u64,
        frame: &[u8],
        n: u32,
    ) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for _ in 0..n {
            *offset_ms += 20;
            let now = start + Duration::from_millis(*offset_ms);
            if let Some(seg_bytes) = seg.feed_at(frame, now) {
                out.push(seg_bytes);
            }
        }
        out
    }

    #[test]
    fn no_emission_below_min_bytes() {
        let mut cfg = test_cfg();
        cfg.min_bytes = 60_000;
        let mut seg = Segmenter::new(cfg);
        let start = Instant::now();
        let mut off = 0;
        // 5 loud + 40 silent frames: the silence window closes but the
        // buffer (45 * 640 = 28800 bytes) stays under the minimum.
        assert!(feed_frames(&mut seg, start, &mut off, &loud_frame(), 5).is_empty());
        assert!(feed_frames(&mut seg, start, &mut off, &silent_frame(), 40).is_empty());
    }

    #[test]
    fn no_emission_before_silence_threshold() {
        let mut seg = Segmenter::new(test_cfg());
        let start = Instant::now();
        let mut off = 0;
        // 50 loud frames (32000 bytes, over min) then 20 silent frames
        // (400ms < 500ms threshold).
        assert!(feed_frames(&mut seg, start, &mut off, &loud_frame(), 50).is_empty());
        assert!(feed_frames(&mut seg, start, &mut off, &silent_frame(), 20).is_empty());
    }

    #[test]
    fn tone_then_silence_emits_once() {
        let mut seg = Segmenter::new(test_cfg());
        let start = Instant::now();
        let mut off = 0;
        assert!(feed_frames(&mut seg, start, &mut off, &loud_frame(), 50).is_empty());
        let emissions = feed_frames(&mut seg, start, &mut off, &silent_frame(), 25);
        assert_eq!(emissions.len(), 1);
        // tone (50 frames) + trailing silence up to the threshold (25 frames)
        assert_eq!(emissions[0].len(), 75 * 640);
        assert_eq!(seg.buffered_bytes(), 0);
    }

    #[test]
    fn pure_silence_never_emits() {
        let mut seg = Segmenter::new(test_cfg());
        let start = Instant::now();
        let mut off = 0;
        // 4 seconds of dead air: no turn, and no unbounded buffering either.
        assert!(feed_frames(&mut seg, start, &mut off, &silent_frame(), 200).is_empty());
        assert!(seg.buffered_bytes() <= 26 * 640);
    }

    #[test]
    fn silence_tone_silence_yields_exactly_one_turn() {
        // The end-to-end shape: 1s silence, 1s tone, 1s silence. The
        // emission carries the tone plus trailing silence up to the
        // threshold; leading dead air was trimmed away while unvoiced.
        let mut seg = Segmenter::new(test_cfg());
        let start = Instant::now();
        let mut off = 0;
        let mut emissions = Vec::new();
        emissions.extend(feed_frames(&mut seg, start, &mut off, &silent_frame(), 50));
        emissions.extend(feed_frames(&mut seg, start, &mut off, &loud_frame(), 50));
        emissions.extend(feed_frames(&mut seg, start, &mut off, &silent_frame(), 50));
        assert_eq!(emissions.len(), 1);
        let len = emissions[0].len();
        // 50 tone frames + 25 trailing silent frames, plus at most the
        // sub-window silence residue kept from before the tone started.
        assert!(len >= 75 * 640 && len <= 100 * 640, "len={}", len);
    }

    #[test]
    fn flush_above_min_emits_exactly_once() {
        let mut seg = Segmenter::new(test_cfg());
        let start = Instant::now();
        let mut off = 0;
        feed_frames(&mut seg, start, &mut off, &loud_frame(), 40);
        let flushed = seg.flush().expect("flush should emit");
        assert_eq!(flushed.len(), 40 * 640);
        assert!(seg.flush().is_none());
    }

    #[test]
    fn flush_empty_or_small_emits_nothing() {
        let mut seg = Segmenter::new(test_cfg());
        assert!(seg.flush().is_none());
        let start = Instant::now();
        let mut off = 0;
        feed_frames(&mut seg, start, &mut off, &loud_frame(), 5);
        assert!(seg.flush().is_none());
    }
}
