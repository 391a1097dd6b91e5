use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "moodscope", about = "Stream per-chunk music emotion analysis as NDJSON")]
pub struct Cli {
    /// URL of the audio file to analyze
    pub audio_url: String,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write records to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Chunk length in seconds
    #[arg(long, default_value_t = 7.0)]
    pub chunk_seconds: f32,

    /// Distance between chunk starts in seconds
    #[arg(long, default_value_t = 6.0)]
    pub hop_seconds: f32,

    /// Short 2s/1s windowing for a fast first pass
    #[arg(long, conflicts_with_all = ["chunk_seconds", "hop_seconds"])]
    pub quick: bool,

    /// Skip image generation; every image_ref is null
    #[arg(long)]
    pub no_images: bool,

    /// Additional allowed source host (repeatable)
    #[arg(long = "allow-host")]
    pub allow_hosts: Vec<String>,
}
