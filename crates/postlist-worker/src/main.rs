//! Post ingestion worker binary.
//!
//! `postlist-worker <url-or-shortcode>...` processes every source and prints
//! their events as JSON lines. Ctrl-C cancels whatever is still running.

use std::sync::Arc;

use anyhow::{bail, Context};
use futures::future::join_all;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use postlist_media::{check_ffmpeg, check_ffprobe, check_ytdlp, CookieSession};
use postlist_ml_client::MlClient;
use postlist_models::SessionId;
use postlist_worker::{
    CacheSweeper, Collaborators, FfmpegFrameExtractor, GeminiGenerator, HttpTranscriber,
    MlClassifier, Orchestrator, TranscribeConfig, WorkerConfig, YtDlpDownloader,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let sources: Vec<String> = std::env::args().skip(1).collect();
    if sources.is_empty() {
        bail!("usage: postlist-worker <post-url-or-shortcode>...");
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        postlist_worker::metrics::init_metrics(addr)
            .with_context(|| format!("Failed to start metrics exporter on {}", addr))?;
        info!("Serving metrics on {}", addr);
    }

    for (tool, check) in [
        ("ffmpeg", check_ffmpeg()),
        ("ffprobe", check_ffprobe()),
        ("yt-dlp", check_ytdlp()),
    ] {
        if let Err(e) = check {
            warn!("{} unavailable: {}", tool, e);
        }
    }

    let collaborators = build_collaborators(&config)?;
    let orchestrator = Orchestrator::new(config.clone(), collaborators)
        .await
        .context("Failed to open result cache")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = CacheSweeper::new(
        Arc::clone(orchestrator.cache()),
        Arc::clone(orchestrator.progress()),
        config.sweep_interval,
        config.status_retention,
    );
    let sweeper_handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let session = SessionId::new();
    let mut printers = Vec::new();
    let mut tasks = Vec::new();

    for source in &sources {
        match orchestrator.start(&session, source).await {
            Ok(mut handle) => {
                if let Some(task) = handle.task.take() {
                    tasks.push(task);
                }
                let request_id = handle.request_id.clone();
                let replayed = handle.replayed;
                printers.push(tokio::spawn(async move {
                    while let Some(event) = handle.events.recv().await {
                        let line = json!({
                            "request_id": request_id,
                            "replayed": replayed,
                            "event": event,
                        });
                        println!("{}", line);
                    }
                }));
            }
            Err(e) => {
                error!(source = %source, "Failed to start: {}", e);
                println!("{}", json!({"source": source, "event": {"type": "error", "message": e.to_string()}}));
            }
        }
    }

    tokio::select! {
        _ = join_all(&mut printers) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let canceled = orchestrator.end_session(&session).await;
            info!("Canceled {} running requests", canceled);
            join_all(&mut printers).await;
        }
    }

    for outcome in join_all(tasks).await {
        if let Err(e) = outcome {
            error!("Pipeline task panicked: {}", e);
        }
    }

    shutdown_tx.send(true).ok();
    sweeper_handle.await.ok();

    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("postlist=info".parse()?)
        .add_directive("hyper=warn".parse()?);

    // Events go to stdout, logs to stderr
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn build_collaborators(config: &WorkerConfig) -> anyhow::Result<Collaborators> {
    let cookies = CookieSession::new(
        config.cookies_path.clone(),
        std::env::temp_dir().join("postlist").join("cookies.txt"),
    );
    let downloader = YtDlpDownloader::new(cookies, config.media_timeout_secs)?;
    let classifier = MlClassifier::new(MlClient::from_env().context("Failed to create ML client")?);
    let transcriber = HttpTranscriber::new(TranscribeConfig::from_env())?;
    let generator = GeminiGenerator::from_env()?;

    Ok(Collaborators {
        downloader: Arc::new(downloader),
        extractor: Arc::new(FfmpegFrameExtractor::new(config.sampler_config())),
        classifier: Arc::new(classifier),
        transcriber: Arc::new(transcriber),
        generator: Arc::new(generator),
    })
}
