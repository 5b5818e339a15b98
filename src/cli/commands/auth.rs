use std::collections::HashMap;

use anyhow::{Context, Result};
use plx::utils::unix_now;
use plx::{Aggregator, Platform};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

const CALLBACK_ADDR: &str = "127.0.0.1:8888";

struct Callback {
    code: String,
    state: String,
    stream: TcpStream,
}

/// Run the authorization flow for the given platform.
pub async fn run(platform: Platform, aggregator: &Aggregator) -> Result<()> {
    let auth_url = aggregator
        .authorization_url(platform, unix_now())
        .with_context(|| format!("Cannot start authorization for {platform}"))?;

    // bind before opening the browser so a fast redirect isn't refused
    let listener = TcpListener::bind(CALLBACK_ADDR)
        .await
        .context("Failed to bind to port 8888. Is another instance running?")?;

    println!("Opening browser for {platform} authorization...\n");
    println!("If it doesn't open, visit:\n{}\n", auth_url);

    let _ = open::that(&auth_url);

    let mut callback = wait_for_callback(&listener).await?;

    println!("Exchanging code for token...");
    let outcome = aggregator
        .complete_authorization(platform, &callback.state, &callback.code, unix_now())
        .await;

    match outcome {
        Ok(_) => {
            send_response(
                &mut callback.stream,
                "200 OK",
                "<html><body><h1>Success!</h1><p>You can close this tab.</p></body></html>",
            )
            .await?;
            println!("\nSuccessfully authenticated with {platform}!");
            Ok(())
        }
        Err(err) => {
            send_response(&mut callback.stream, "400 Bad Request", &format!("Auth failed: {err}"))
                .await?;
            Err(err).with_context(|| format!("Authorization with {platform} failed"))
        }
    }
}

async fn wait_for_callback(listener: &TcpListener) -> Result<Callback> {
    println!("Waiting for callback...");

    loop {
        let (mut stream, peer) = listener.accept().await?;
        debug!(%peer, "callback connection");

        let mut request_line = String::new();
        BufReader::new(&mut stream).read_line(&mut request_line).await?;

        // GET /callback?code=xxx&state=yyy HTTP/1.1
        let Some(query) = request_line
            .split_whitespace()
            .nth(1)
            .and_then(|path| path.strip_prefix("/callback?"))
        else {
            send_response(&mut stream, "404 Not Found", "Not Found").await?;
            continue;
        };

        let params: HashMap<&str, String> = query
            .split('&')
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k, urlencoding::decode(v).map(|v| v.into_owned()).unwrap_or_default()))
            .collect();

        if let Some(error) = params.get("error") {
            send_response(&mut stream, "400 Bad Request", &format!("Auth failed: {error}")).await?;
            anyhow::bail!("Authorization denied: {}", error);
        }

        match (params.get("code"), params.get("state")) {
            (Some(code), Some(state)) => {
                return Ok(Callback {
                    code: code.clone(),
                    state: state.clone(),
                    stream,
                })
            }
            _ => {
                send_response(&mut stream, "400 Bad Request", "Missing code or state").await?;
            }
        }
    }
}

async fn send_response(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
