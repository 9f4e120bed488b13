use anyhow::Result;
use log::info;
use reqwest::{multipart, Client};
use serde::Deserialize;

use crate::ai::{AiFuture, AsrPort};
use crate::config;
use crate::media;

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Whisper-style HTTP transcription: multipart WAV upload, JSON text back.
pub struct HttpAsrPort {
    url: String,
    client: Client,
}

impl HttpAsrPort {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config::timeouts().asr_http)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl AsrPort for HttpAsrPort {
    fn transcribe(&self, pcm16k: Vec<u8>, lang: String) -> AiFuture<Result<String>> {
        let url = self.url.clone();
        let client = self.client.clone();
        Box::pin(async move {
            if pcm16k.is_empty() {
                return Ok(String::new());
            }
            let wav = media::pcm_to_wav_bytes(&pcm16k, 16_000)?;
            let part = multipart::Part::bytes(wav)
                .file_name("utterance.wav")
                .mime_str("audio/wav")?;
            let form = multipart::Form::new()
                .part("file", part)
                .text("language", lang);

            let resp: TranscriptionResponse = client
                .post(url)
                .multipart(form)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let text = resp.text.trim().to_string();
            if !text.is_empty() {
                info!("[asr] transcript: {:?}", text);
            }
            Ok(text)
        })
    }
}
