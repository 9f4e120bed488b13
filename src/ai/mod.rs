//! Collaborator ports: ASR, dialog processing and TTS are thin network
//! calls to other services. External I/O stays behind these traits so the
//! session controller can be exercised without any of them running.

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

pub mod asr;
pub mod dialog;
pub mod tts;

pub use asr::HttpAsrPort;
pub use dialog::HttpDialogPort;
pub use tts::HttpTtsPort;

pub type AiFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Speech to text. Input is PCM16/16k/mono; empty text means "nothing
/// recognized" and is a normal outcome, not an error.
pub trait AsrPort: Send + Sync {
    fn transcribe(&self, pcm16k: Vec<u8>, lang: String) -> AiFuture<Result<String>>;
}

/// Text in, reply text out, keyed by caller identity.
pub trait DialogPort: Send + Sync {
    fn process(&self, text: String, caller: String) -> AiFuture<Result<String>>;
}

/// Text to speech. Output is PCM16/16k/mono.
pub trait TtsPort: Send + Sync {
    fn synthesize(&self, text: String) -> AiFuture<Result<Vec<u8>>>;
}
