// crates/cli/src/main.rs
//! `polydub` binary: submit a video for translation into N languages and
//! watch every job converge, with one progress bar per language fed by the
//! tracker's snapshot stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use polydub_client::{
    spawn_push_feed, ClientConfig, PushFeedConfig, ServiceClient, TranslationRequest,
};
use polydub_engine::{BatchEvent, BatchTracker, TrackerConfig};
use polydub_types::{BatchSnapshot, JobStatus};

#[derive(Parser)]
#[command(name = "polydub", version, about = "Batch video translation tracker")]
struct Cli {
    /// API key for x-api-key auth. Without it the client falls back to
    /// POLYDUB_API_TOKEN or the client id/secret token exchange.
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the target languages the service offers.
    Languages,
    /// List voices available for one target language.
    Voices { language: String },
    /// Query one job's current status by remote id.
    Status { remote_id: String },
    /// Submit a video and track all per-language jobs to completion.
    Translate {
        /// Source video URL.
        url: String,
        /// Target language codes (comma-separated or repeated).
        #[arg(short, long, required = true, value_delimiter = ',')]
        languages: Vec<String>,
        /// Public webhook URL forwarded to the service; point it at the
        /// bridge's /api/webhook to enable push updates.
        #[arg(long)]
        webhook_url: Option<String>,
        /// Seconds between poll cycles.
        #[arg(long, default_value_t = 3)]
        poll_interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,polydub=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::default();
    let client = match &cli.api_key {
        Some(key) => ServiceClient::with_api_key(config, key.clone()),
        None => ServiceClient::new(config),
    };

    match cli.command {
        Command::Languages => {
            let languages = client.list_languages().await?;
            for lang in languages {
                let voice_note = if lang.need_voice_id {
                    "  (voice selection required)"
                } else {
                    ""
                };
                println!("{:<8} {}{voice_note}", lang.lang_code, lang.lang_name);
            }
        }
        Command::Voices { language } => {
            let voices = client.list_voices(&language).await?;
            if voices.is_empty() {
                println!("no voices listed for {language}");
            }
            for voice in voices {
                println!("{:<28} {:<20} {}", voice.voice_id, voice.name, voice.gender);
            }
        }
        Command::Status { remote_id } => {
            let report = client.video_status(&remote_id).await?;
            println!("status:   {:?} ({}%)", report.status, report.progress);
            if let Some(url) = report.result_url {
                println!("result:   {url}");
            }
            if let Some(reason) = report.error_reason {
                println!("reason:   {reason}");
            }
        }
        Command::Translate {
            url,
            languages,
            webhook_url,
            poll_interval,
        } => {
            translate(client, url, languages, webhook_url, poll_interval).await?;
        }
    }
    Ok(())
}

async fn translate(
    client: ServiceClient,
    url: String,
    languages: Vec<String>,
    webhook_url: Option<String>,
    poll_interval: u64,
) -> Result<()> {
    let mut request = TranslationRequest::new(url, &languages);
    request.webhook_url = webhook_url;

    let outcome = client
        .create_translation(&request)
        .await
        .context("batch creation failed")?;

    let client = Arc::new(client);
    let tracker = BatchTracker::new(
        client,
        TrackerConfig {
            poll_interval: Duration::from_secs(poll_interval.max(1)),
        },
    );
    let mut events = tracker.subscribe();
    tracker.start_batch(&languages, outcome).await?;
    let push_token = spawn_push_feed(tracker.clone(), PushFeedConfig::default());

    let initial = tracker.snapshot().await;
    for language in &initial.not_started {
        eprintln!("  \u{2717} {language}: not started");
    }

    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template("  {prefix:>6} [{bar:30}] {pos:>3}% {msg}")
        .expect("valid bar template")
        .progress_chars("=> ");
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();
    for (language, job) in &initial.jobs {
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(style.clone());
        bar.set_prefix(language.clone());
        bar.set_position(job.progress as u64);
        bars.insert(language.clone(), bar);
    }

    let last = watch(&mut events, &bars, initial).await;
    push_token.cancel();

    println!();
    let mut any_failed = !last.not_started.is_empty();
    let mut ordered: Vec<_> = last.jobs.values().collect();
    ordered.sort_by(|a, b| a.language.cmp(&b.language));
    for job in ordered {
        match job.status {
            JobStatus::Completed => {
                let url = job.result_url.as_deref().unwrap_or("(url missing)");
                println!("  \u{2713} {}: {url}", job.language);
            }
            JobStatus::Failed => {
                any_failed = true;
                let reason = job.error_reason.as_deref().unwrap_or("failed");
                println!("  \u{2717} {}: {reason}", job.language);
            }
            _ => {
                any_failed = true;
                println!("  ? {}: still {:?}", job.language, job.status);
            }
        }
    }
    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Drive the bars from snapshot events until the batch completes or the
/// tracker goes away. Snapshots are self-contained, so a lagged receiver
/// just resyncs on the next one.
async fn watch(
    events: &mut broadcast::Receiver<BatchEvent>,
    bars: &HashMap<String, ProgressBar>,
    initial: BatchSnapshot,
) -> BatchSnapshot {
    let mut last = initial;
    loop {
        match events.recv().await {
            Ok(BatchEvent::Snapshot(snapshot)) => {
                render(bars, &snapshot);
                // Completion rides on every snapshot, so a receiver that
                // lagged past the one BatchComplete edge still terminates.
                if snapshot.batch_complete {
                    return snapshot;
                }
                last = snapshot;
            }
            Ok(BatchEvent::BatchComplete(snapshot)) => {
                render(bars, &snapshot);
                return snapshot;
            }
            Ok(BatchEvent::GlobalError { message }) => {
                eprintln!("  translation service error: {message}");
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return last,
        }
    }
}

fn render(bars: &HashMap<String, ProgressBar>, snapshot: &BatchSnapshot) {
    for (language, job) in &snapshot.jobs {
        let Some(bar) = bars.get(language) else {
            continue;
        };
        bar.set_position(job.progress as u64);
        match job.status {
            JobStatus::Queued => bar.set_message("queued"),
            JobStatus::Processing => bar.set_message("processing"),
            JobStatus::Completed => {
                if !bar.is_finished() {
                    bar.finish_with_message("done");
                }
            }
            JobStatus::Failed => {
                if !bar.is_finished() {
                    let reason = job.error_reason.as_deref().unwrap_or("failed");
                    bar.abandon_with_message(format!("failed: {reason}"));
                }
            }
        }
    }
}
