//! Outbound dial trigger: a small HTTP endpoint that originates a call
//! through ARI and hands the opening line to the bridge as a Stasis
//! argument (percent-encoded, decoded again on StasisStart).

use anyhow::Result;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ari_voicebridge::ari::AriClient;
use ari_voicebridge::config::Config;
use ari_voicebridge::logging;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    caller_id: String,
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cfg = Config::from_env()?;
    let ari = AriClient::new(&cfg)?;

    let listener = TcpListener::bind(&cfg.dialer_bind).await?;
    log::info!("[dialer] listening on {}", cfg.dialer_bind);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let ari = ari.clone();
        let cfg = cfg.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(&mut socket, &ari, &cfg).await {
                log::warn!("[dialer] request from {} failed: {:?}", peer, e);
            }
        });
    }
}

async fn handle_conn(socket: &mut TcpStream, ari: &AriClient, cfg: &Config) -> Result<()> {
    let (request_line, body) = read_request(socket).await?;

    if !request_line.starts_with("POST /call") {
        write_response(socket, 404, r#"{"error":"not found"}"#).await?;
        return Ok(());
    }

    let req: CallRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            write_response(socket, 400, &format!(r#"{{"error":"{}"}}"#, e)).await?;
            return Ok(());
        }
    };
    let number = req.caller_id.trim();
    let message = req.message.trim();
    if number.is_empty() || message.is_empty() {
        write_response(socket, 400, r#"{"error":"callerId and message must be non-empty"}"#)
            .await?;
        return Ok(());
    }

    let endpoint = cfg.endpoint_template.replace("{number}", number);
    log::info!("[dialer] originating {} ({} chars)", endpoint, message.len());

    match ari
        .originate(
            &endpoint,
            &urlencoding::encode(message),
            number,
            cfg.dial_timeout_s,
        )
        .await
    {
        Ok(res) => {
            let body = serde_json::json!({"ok": true, "ari": res}).to_string();
            write_response(socket, 200, &body).await?;
        }
        Err(e) => {
            log::warn!("[dialer] originate failed: {:?}", e);
            let body = serde_json::json!({"ok": false, "error": e.to_string()}).to_string();
            write_response(socket, 500, &body).await?;
        }
    }
    Ok(())
}

/// Minimal HTTP/1.1 request reader: request line + Content-Length body.
async fn read_request(socket: &mut TcpStream) -> Result<(String, Vec<u8>)> {
    let mut buf = vec![0u8; 8192];
    let mut read_len = 0usize;

    let header_end = loop {
        let n = socket.read(&mut buf[read_len..]).await?;
        if n == 0 {
            anyhow::bail!("connection closed before headers");
        }
        read_len += n;
        if let Some(pos) = find_header_end(&buf[..read_len]) {
            break pos;
        }
        if read_len == buf.len() {
            anyhow::bail!("request headers too large");
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let request_line = head.lines().next().unwrap_or_default().to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[header_end + 4..read_len].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0u8; content_length - body.len()];
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("connection closed mid-body");
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    Ok((request_line, body))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn write_response(socket: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let resp = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    socket.write_all(resp.as_bytes()).await?;
    Ok(())
}
