use anyhow::Result;
use reqwest::Client;
use serde::Serialize;

use crate::ai::{AiFuture, DialogPort};
use crate::config;

#[derive(Serialize)]
struct DialogRequest<'a> {
    caller: &'a str,
    text: &'a str,
}

/// Forwards recognized text to the automation webhook and returns its
/// reply. The endpoint answers either `{"reply": "..."}` or plain text.
pub struct HttpDialogPort {
    url: String,
    client: Client,
}

impl HttpDialogPort {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config::timeouts().dialog_http)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl DialogPort for HttpDialogPort {
    fn process(&self, text: String, caller: String) -> AiFuture<Result<String>> {
        let url = self.url.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let body = client
                .post(url)
                .json(&DialogRequest {
                    caller: &caller,
                    text: &text,
                })
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok(extract_reply(&body))
        })
    }
}

/// Pulls the reply out of the webhook response body.
fn extract_reply(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => match v.get("reply") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => v.to_string(),
        },
        Err(_) => body.to_string(),
    }
}
