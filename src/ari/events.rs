use serde::Deserialize;

/// Subset of the ARI event feed this application reacts to. Everything
/// else deserializes too (only `type` is required) and is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AriEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub channel: Option<AriChannel>,
    /// Stasis application arguments; the dialer passes the opening line
    /// as the (percent-encoded) first argument.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AriChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channeltype: Option<String>,
    #[serde(default)]
    pub caller: Option<AriCallerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AriCallerInfo {
    #[serde(default)]
    pub number: Option<String>,
}

impl AriEvent {
    pub fn channel_id(&self) -> Option<&str> {
        self.channel.as_ref().map(|c| c.id.as_str())
    }

    pub fn caller_number(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .and_then(|c| c.caller.as_ref())
            .and_then(|c| c.number.as_deref())
            .filter(|n| !n.is_empty())
    }
}

const TELEPHONY_TYPES: &[&str] = &["PJSIP", "SIP", "DAHDI"];
const TELEPHONY_PREFIXES: &[&str] = &["PJSIP/", "SIP/", "DAHDI/"];

/// A StasisStart also fires for our own external-media leg; only channels
/// that look like a real telephony endpoint start a call session.
pub fn is_caller_event(ev: &AriEvent) -> bool {
    let Some(ch) = ev.channel.as_ref() else {
        return false;
    };
    let tech = ch
        .channeltype
        .as_deref()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if TELEPHONY_TYPES.contains(&tech.as_str()) {
        return true;
    }
    if ev.caller_number().is_some() {
        return true;
    }
    let name = ch.name.as_deref().unwrap_or_default();
    TELEPHONY_PREFIXES.iter().any(|p| name.starts_with(p))
}
