use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use compress_client::insights::ImageInsights;
use compress_client::utils::format_size_kb;
use compress_client::{
    BatchEvent, BatchOutcome, HttpTransport, Orchestrator, PendingBatch, SelectedFile, Settings,
};

/// Compress up to five images through the compression service
#[derive(Parser, Debug, PartialEq)]
#[command(name = "image-compress-client", about, version)]
struct CliArgs {
    /// Compression quality; overrides the saved setting
    #[arg(short, long)]
    quality: Option<u8>,

    /// Service URL to upload to
    #[arg(long)]
    endpoint: Option<String>,

    /// Directory the compressed images are written to
    #[arg(short = 'o', long = "out")]
    output_dir: Option<PathBuf>,

    /// Store the effective options in the settings file
    #[arg(long = "save")]
    save_settings: bool,

    /// Images to compress
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn render_event(event: &BatchEvent) {
    match event {
        BatchEvent::FileStarted { file_name, index, total } => {
            println!("📤 [{}/{}] Uploading {}", index + 1, total, file_name);
        }
        BatchEvent::Progress { file_name, percent } => {
            let filled = (*percent as usize) / 5;
            println!("   {} [{:<20}] {}%", file_name, "#".repeat(filled), percent);
        }
        BatchEvent::FileFailed { file_name, message } => {
            println!("   ❌ {}: {}", file_name, message);
        }
        BatchEvent::FileCompleted { file_name, compression_ratio, .. } => {
            println!("   ✅ {} compressed ({:.2}x)", file_name, compression_ratio);
        }
        BatchEvent::BatchFinished { succeeded, failed } => {
            println!("\n🎉 Batch finished: {} compressed, {} failed", succeeded, failed);
        }
    }
}

async fn report(outcome: &BatchOutcome, settings: &Settings, quality: u8) -> Result<()> {
    for result in &outcome.results {
        let insights = ImageInsights::gather(result).await;

        println!("\n🖼️  {}", result.source_file.name());
        println!("   Original Size:     {}", format_size_kb(result.original_size));
        println!("   Compressed Size:   {}", format_size_kb(result.compressed_size));
        println!("   Compression Ratio: {:.2}x", result.compression_ratio);
        println!("   Space Saved:       {:.1}%", result.space_saved_percent());
        println!("   Quality Setting:   {}/{}", quality, settings.quality_max);
        if let (Some(w), Some(h)) = (insights.width, insights.height) {
            println!("   Dimensions:        {} x {}", w, h);
        }
        if let Some(ref ratio) = insights.aspect_ratio {
            println!("   Aspect Ratio:      {}", ratio);
        }
        if let Some(ref mode) = insights.color_mode {
            println!("   Color Mode:        {}", mode);
        }
        if let Some(ref format) = insights.format {
            println!("   Format:            {}", format);
        }
    }

    let output_dir = settings
        .output_path()
        .or_else(|| settings.save_results.then(|| PathBuf::from(".")));
    if let Some(dir) = output_dir {
        for result in &outcome.results {
            let path = result
                .save_into(&dir)
                .await
                .with_context(|| format!("Failed to save {}", result.download_name()))?;
            println!("💾 Saved {}", path.display());
        }
    }

    if !outcome.errors.is_empty() {
        println!("\n⚠️  {} error(s):", outcome.errors.len());
        for message in outcome.error_messages() {
            println!("   {}", message);
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = CliArgs::parse();

    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(endpoint) = args.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(quality) = args.quality {
        settings.quality = quality;
    }
    if let Some(dir) = args.output_dir {
        settings.output_dir = Some(dir.to_string_lossy().to_string());
    }
    let quality = settings.validate_quality(settings.quality)?;

    if args.save_settings {
        settings.save().context("Failed to save settings")?;
        println!("✅ Settings saved to {}", Settings::config_path().display());
    }

    let selected = args
        .files
        .iter()
        .map(SelectedFile::from_path)
        .collect::<Result<Vec<_>, _>>()?;
    let mut batch = PendingBatch::new();
    batch.add_files(selected)?;

    let transport = HttpTransport::from_settings(&settings)?;
    println!("🗜️  Compressing {} image(s) at quality {} via {}", batch.len(), quality, transport.endpoint());
    let mut orchestrator = Orchestrator::new(transport);

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    render_event(&event);
                    if matches!(event, BatchEvent::BatchFinished { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    println!("   … {} progress update(s) skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = orchestrator.run(&batch, quality).await;
    printer.await.context("Progress printer stopped unexpectedly")?;

    report(&outcome, &settings, quality).await
}
