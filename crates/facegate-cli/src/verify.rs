//! `facegate verify` and `facegate emotion`: the camera-driven commands.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use facegate_client::HttpBackend;
use facegate_core::{
    spawn_orchestrator, CaptureSource, EmotionCaptureFlow, SharedCapture, VerificationResult,
};

use crate::account::print_users;
use crate::camera::DirectoryCamera;
use crate::config::Config;
use crate::sink::TerminalSink;

fn open_capture(config: &Config, frames: Option<PathBuf>) -> Result<SharedCapture<DirectoryCamera>> {
    let dir = frames
        .or_else(|| config.frames_dir.clone())
        .context("no frame directory: pass --frames or set FACEGATE_FRAMES_DIR")?;
    Ok(CaptureSource::with_quality(DirectoryCamera::new(dir), config.jpeg_quality).shared())
}

pub(crate) fn backend(config: &Config) -> Result<Arc<HttpBackend>> {
    let backend = HttpBackend::with_connect_timeout(&config.server_url, config.connect_timeout())
        .with_context(|| format!("cannot create client for {}", config.server_url))?;
    Ok(Arc::new(backend))
}

/// Run one verification session. Returns whether it succeeded.
pub async fn verify(
    config: &Config,
    frames: Option<PathBuf>,
    name: Option<String>,
    json: bool,
) -> Result<bool> {
    let capture = open_capture(config, frames)?;
    let backend = backend(config)?;
    let (sink, mut name_requests) = TerminalSink::with_name_requests();

    let handle = spawn_orchestrator(capture, backend, Arc::new(sink), config.orchestrator());
    let token = handle.trigger_capture().await?;

    let outcome = loop {
        tokio::select! {
            result = handle.wait_for_result(token) => break result?,
            Some(requested) = name_requests.recv() => {
                let display_name = match &name {
                    Some(n) => n.clone(),
                    None => prompt_display_name().await?,
                };
                // A rejected name fails the session; the result arrives above.
                if let Err(e) = handle.submit_display_name(requested, &display_name).await {
                    tracing::debug!(error = %e, "display name not accepted");
                }
            }
        }
    };
    handle.shutdown().await?;

    let Some(result) = outcome else {
        bail!("session {token} ended without a result");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result {
            VerificationResult::LoggedIn { username, redirect } => match redirect {
                Some(to) => println!("Logged in as {username} (continue at {to})"),
                None => println!("Logged in as {username}"),
            },
            VerificationResult::Registered { username } => println!("Registered {username}"),
            VerificationResult::Failed(e) => println!("Verification failed: {e}"),
            VerificationResult::TimedOut => println!("Verification timed out"),
        }
    }
    Ok(result.is_success())
}

async fn prompt_display_name() -> Result<String> {
    tokio::task::spawn_blocking(|| -> Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "New face. Display name: ")?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await
    .context("display-name prompt panicked")?
}

/// Record one emotion sample, then print the refreshed user list.
pub async fn emotion(config: &Config, frames: Option<PathBuf>, json: bool) -> Result<bool> {
    let capture = open_capture(config, frames)?;
    let backend = backend(config)?;
    let flow = EmotionCaptureFlow::new(capture.clone(), backend.clone(), Arc::new(TerminalSink::new()));

    let recorded = flow.capture().await;
    capture.lock().await.close();

    let emotion = match recorded {
        Ok(emotion) => emotion,
        Err(e) => {
            println!("Emotion capture failed: {e}");
            return Ok(false);
        }
    };
    if !json {
        println!("Emotion: {emotion}");
    }

    let users = backend.user_list().await?;
    print_users(&users, json)?;
    Ok(true)
}
