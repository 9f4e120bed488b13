use anyhow::{bail, Result};
use log::debug;
use reqwest::Client;
use serde::Serialize;

use crate::ai::{AiFuture, TtsPort};
use crate::config;
use crate::media;

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

/// HTTP synthesis: JSON request, WAV body back. The synthesizer may
/// stream; reqwest buffers the chunks into one body before we decode.
pub struct HttpTtsPort {
    url: String,
    client: Client,
}

impl HttpTtsPort {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config::timeouts().tts_http)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl TtsPort for HttpTtsPort {
    fn synthesize(&self, text: String) -> AiFuture<Result<Vec<u8>>> {
        let url = self.url.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let body = client
                .post(url)
                .json(&TtsRequest { text: &text })
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;

            let (pcm, rate) = media::wav_bytes_to_pcm(&body)?;
            debug!("[tts] {} bytes pcm at {} Hz", pcm.len(), rate);
            match rate {
                16_000 => Ok(pcm),
                8_000 => Ok(media::upsample_8k_to_16k(&pcm)),
                other => bail!("unsupported TTS sample rate {}", other),
            }
        })
    }
}
