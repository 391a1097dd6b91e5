mod audio;
mod cli;
mod config;
mod emotion;
mod error;
mod imagery;
mod source;
mod stream;
mod visual;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;

use audio::chunker::ChunkConfig;
use audio::decode::HttpAudioSource;
use cli::Cli;
use config::{Config, ImageBackend};
use emotion::openai::OpenAiClassifier;
use imagery::openai::OpenAiImages;
use imagery::replicate::ReplicateImages;
use imagery::ImageSynthesizer;
use stream::orchestrator::{Pipeline, PipelineSettings, StreamOutcome};
use stream::sink::{NdjsonSink, ProgressSink};

/// Exit status for a request refused before streaming.
const EXIT_REJECTED: u8 = 2;

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                log::warn!("{:#}; using defaults", e);
                Config::default()
            }
        },
        None => Config::default(),
    };

    // Config values apply only when the CLI is at its default
    if cli.quick {
        cfg.chunking = ChunkConfig::QUICK;
    } else {
        if cli.chunk_seconds != 7.0 { cfg.chunking.chunk_seconds = cli.chunk_seconds; }
        if cli.hop_seconds != 6.0 { cfg.chunking.hop_seconds = cli.hop_seconds; }
    }
    cfg.source.allowed_hosts.append(&mut cli.allow_hosts);
    if cli.no_images {
        cfg.synthesis.backend = ImageBackend::Disabled;
    }

    let pipeline = Pipeline {
        source: Box::new(HttpAudioSource::new(cfg.source.timeout())?),
        classifier: Box::new(OpenAiClassifier::new(&cfg.classifier, require_env("OPENAI_API_KEY")?)?),
        synthesizer: build_synthesizer(&cfg)?,
        settings: PipelineSettings {
            allowed_hosts: cfg.source.allowed_hosts.clone(),
            chunking: cfg.chunking,
            classify_timeout_retries: cfg.classifier.timeout_retries,
            poll: cfg.synthesis.poll_policy(),
        },
    };

    log::info!("moodscope - music emotion stream");
    log::info!("Source: {}", cli.audio_url);
    log::info!(
        "Chunks: {:.1}s every {:.1}s, images: {:?}",
        cfg.chunking.chunk_seconds,
        cfg.chunking.hop_seconds,
        cfg.synthesis.backend
    );

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut sink = ProgressSink::new(NdjsonSink::new(writer));

    let outcome = match pipeline.run(&cli.audio_url, &mut sink) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("{}", e);
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    };

    Ok(match outcome {
        StreamOutcome::Completed { chunks } => {
            log::info!("Done: {} chunks", chunks);
            ExitCode::SUCCESS
        }
        StreamOutcome::Failed(_) => ExitCode::FAILURE,
        StreamOutcome::Disconnected => {
            log::info!("Consumer disconnected");
            ExitCode::SUCCESS
        }
    })
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{name} is not set"))
}

fn build_synthesizer(cfg: &Config) -> Result<Option<Box<dyn ImageSynthesizer>>> {
    let synthesizer: Box<dyn ImageSynthesizer> = match cfg.synthesis.backend {
        ImageBackend::Openai => Box::new(OpenAiImages::new(
            &cfg.synthesis,
            require_env("OPENAI_API_KEY")?,
        )?),
        ImageBackend::Replicate => Box::new(ReplicateImages::new(
            &cfg.synthesis,
            require_env("REPLICATE_API_TOKEN")?,
        )?),
        ImageBackend::Disabled => return Ok(None),
    };
    Ok(Some(synthesizer))
}
