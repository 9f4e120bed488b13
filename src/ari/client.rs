use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::config::{self, Config};

/// Thin ARI REST client. Every operation is a single request; retry and
/// polling policy lives with the caller (see `retry::RetryPolicy`).
#[derive(Clone)]
pub struct AriClient {
    base: String,
    user: String,
    pass: String,
    app: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct BridgeCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BridgeInfo {
    #[serde(default)]
    channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelVar {
    #[serde(default)]
    value: Option<String>,
}

impl AriClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config::timeouts().ari_http)
            .build()?;
        Ok(Self {
            base: cfg.ari_base.trim_end_matches('/').to_string(),
            user: cfg.ari_user.clone(),
            pass: cfg.ari_pass.clone(),
            app: cfg.ari_app.clone(),
            http,
        })
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// WebSocket URL of the event feed for this application.
    pub fn events_url(&self) -> String {
        let ws_base = self
            .base
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!(
            "{}/events?api_key={}:{}&app={}&subscribeAll=true",
            ws_base, self.user, self.pass, self.app
        )
    }

    pub async fn create_mixing_bridge(&self) -> Result<String> {
        let created: BridgeCreated = self
            .http
            .post(format!("{}/bridges", self.base))
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[("type", "mixing")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("bridge create response")?;
        Ok(created.id)
    }

    pub async fn add_channel_to_bridge(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.http
            .post(format!("{}/bridges/{}/addChannel", self.base, bridge_id))
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[("channel", channel_id)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Creates the external-media leg pointed at our RTP socket.
    pub async fn create_external_media(&self, external_host: &str) -> Result<String> {
        let created: ChannelCreated = self
            .http
            .post(format!("{}/channels/externalMedia", self.base))
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[
                ("app", self.app.as_str()),
                ("external_host", external_host),
                ("format", "ulaw"),
                ("direction", "both"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("externalMedia response")?;
        Ok(created.id)
    }

    /// True once the channel answers a GET (it takes a moment after create).
    pub async fn channel_exists(&self, channel_id: &str) -> Result<bool> {
        let res = self
            .http
            .get(format!("{}/channels/{}", self.base, channel_id))
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await?;
        Ok(res.status().is_success())
    }

    pub async fn get_channel_var(&self, channel_id: &str, var: &str) -> Result<Option<String>> {
        let parsed: ChannelVar = self
            .http
            .get(format!("{}/channels/{}/variable", self.base, channel_id))
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[("variable", var)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("channel variable response")?;
        Ok(parsed.value)
    }

    pub async fn bridge_has_channel(&self, bridge_id: &str, channel_id: &str) -> Result<bool> {
        let info: BridgeInfo = self
            .http
            .get(format!("{}/bridges/{}", self.base, bridge_id))
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("bridge info response")?;
        Ok(info.channels.iter().any(|c| c == channel_id))
    }

    pub async fn delete_bridge(&self, bridge_id: &str) -> Result<()> {
        self.http
            .delete(format!("{}/bridges/{}", self.base, bridge_id))
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Originates an outbound call into this Stasis app. `app_args` is
    /// passed through verbatim (the dialer percent-encodes the message).
    pub async fn originate(
        &self,
        endpoint: &str,
        app_args: &str,
        caller_id: &str,
        timeout_s: u32,
    ) -> Result<serde_json::Value> {
        let res = self
            .http
            .post(format!("{}/channels", self.base))
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[
                ("endpoint", endpoint),
                ("app", self.app.as_str()),
                ("appArgs", app_args),
                ("callerId", caller_id),
                ("timeout", &timeout_s.to_string()),
            ])
            // Empty JSON body; some ARI versions 500 on a missing body.
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;
        let text = res.text().await.unwrap_or_default();
        if text.is_empty() {
            Ok(serde_json::json!({"status": "ok"}))
        } else {
            Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
        }
    }
}
