use anyhow::Result;
use std::sync::OnceLock;
use std::time::Duration;

/// Core process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// ARI REST base, e.g. "http://127.0.0.1:8088/ari".
    pub ari_base: String,
    pub ari_user: String,
    pub ari_pass: String,
    /// Stasis application name.
    pub ari_app: String,
    /// Local address the external-media leg points at (RTP receive/send socket).
    pub media_ip: String,
    pub media_port: u16,
    /// Language code passed to the ASR.
    pub lang: String,
    /// Default greeting when no Stasis argument is supplied.
    pub welcome: String,
    pub asr_url: String,
    pub dialog_url: String,
    pub tts_url: String,
    /// Dial endpoint template for the dialer binary, "{number}" substituted.
    pub endpoint_template: String,
    pub dialer_bind: String,
    pub dial_timeout_s: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ari_base =
            std::env::var("ARI_BASE").unwrap_or_else(|_| "http://127.0.0.1:8088/ari".to_string());
        let ari_user = std::env::var("ARI_USER").unwrap_or_else(|_| "asterisk".to_string());
        let ari_pass = std::env::var("ARI_PASS").unwrap_or_else(|_| "asterisk".to_string());
        let ari_app = std::env::var("ARI_APP").unwrap_or_else(|_| "voicebridge".to_string());
        let media_ip = std::env::var("MEDIA_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let media_port = std::env::var("MEDIA_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(12000);
        let lang = std::env::var("ASR_LANG").unwrap_or_else(|_| "de".to_string());
        let welcome = std::env::var("WELCOME_TEXT")
            .unwrap_or_else(|_| "Hallo, wie kann ich helfen?".to_string());
        let asr_url = std::env::var("ASR_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9000/asr".to_string());
        let dialog_url = std::env::var("DIALOG_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5678/webhook/on_message".to_string());
        let tts_url = std::env::var("TTS_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9001/tts".to_string());
        let endpoint_template = std::env::var("DIAL_ENDPOINT_TEMPLATE")
            .unwrap_or_else(|_| "PJSIP/{number}".to_string());
        let dialer_bind =
            std::env::var("DIALER_BIND").unwrap_or_else(|_| "0.0.0.0:8099".to_string());
        let dial_timeout_s = std::env::var("DIAL_TIMEOUT_S")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(45);

        Ok(Self {
            ari_base,
            ari_user,
            ari_pass,
            ari_app,
            media_ip,
            media_port,
            lang,
            welcome,
            asr_url,
            dialog_url,
            tts_url,
            endpoint_template,
            dialer_bind,
            dial_timeout_s,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Timeouts {
    pub ari_http: Duration,
    pub asr_http: Duration,
    pub dialog_http: Duration,
    pub tts_http: Duration,
}

impl Timeouts {
    fn from_env() -> Self {
        // Defaults: ARI 5s, ASR/TTS 20s, dialog 10s.
        // Env: ARI_HTTP_TIMEOUT_MS / ASR_HTTP_TIMEOUT_MS / DIALOG_HTTP_TIMEOUT_MS / TTS_HTTP_TIMEOUT_MS.
        Self {
            ari_http: env_duration_ms("ARI_HTTP_TIMEOUT_MS", 5_000),
            asr_http: env_duration_ms("ASR_HTTP_TIMEOUT_MS", 20_000),
            dialog_http: env_duration_ms("DIALOG_HTTP_TIMEOUT_MS", 10_000),
            tts_http: env_duration_ms("TTS_HTTP_TIMEOUT_MS", 20_000),
        }
    }
}

static TIMEOUTS: OnceLock<Timeouts> = OnceLock::new();

pub fn timeouts() -> &'static Timeouts {
    TIMEOUTS.get_or_init(Timeouts::from_env)
}

/// Segmenter tunables. Defaults are the field-tested values.
#[derive(Clone, Debug)]
pub struct SegmenterConfig {
    /// Trailing silence before a turn is considered finished.
    pub silence: Duration,
    /// RMS below this counts as silence.
    pub rms_threshold: f64,
    /// Minimum buffered bytes before a silence-triggered emission.
    pub min_bytes: usize,
    /// Second filter at dispatch: utterances below this are discarded.
    pub min_dispatch_bytes: usize,
}

impl SegmenterConfig {
    fn from_env() -> Self {
        Self {
            silence: env_duration_ms("SEG_SILENCE_MS", 500),
            rms_threshold: std::env::var("SEG_RMS_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(400.0),
            min_bytes: env_usize("SEG_MIN_BYTES", 24_000),
            min_dispatch_bytes: env_usize("SEG_MIN_DISPATCH_BYTES", 32_000),
        }
    }
}

static SEGMENTER: OnceLock<SegmenterConfig> = OnceLock::new();

pub fn segmenter_config() -> &'static SegmenterConfig {
    SEGMENTER.get_or_init(SegmenterConfig::from_env)
}

fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[derive(Clone, Debug)]
pub enum LogMode {
    Stdout,
    File,
}

#[derive(Clone, Debug)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub mode: LogMode,
    pub format: LogFormat,
    pub dir: Option<String>,
    pub file_name: String,
}

impl LoggingConfig {
    fn from_env() -> Self {
        let dir_env = std::env::var("LOG_DIR").ok();
        let mode_env = std::env::var("LOG_MODE").ok();
        let format_env = std::env::var("LOG_FORMAT").ok();

        let format = match format_env.as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let mode = match mode_env.as_deref() {
            Some("file") => LogMode::File,
            Some("stdout") => LogMode::Stdout,
            _ => {
                if dir_env.is_some() {
                    LogMode::File
                } else {
                    LogMode::Stdout
                }
            }
        };

        let dir = match mode {
            LogMode::File => Some(dir_env.unwrap_or_else(|| "logs".to_string())),
            LogMode::Stdout => None,
        };

        let file_name = std::env::var("LOG_FILE_NAME").unwrap_or_else(|_| "app.log".to_string());

        Self {
            mode,
            format,
            dir,
            file_name,
        }
    }
}

static LOGGING: OnceLock<LoggingConfig> = OnceLock::new();

pub fn logging_config() -> &'static LoggingConfig {
    LOGGING.get_or_init(LoggingConfig::from_env)
}
