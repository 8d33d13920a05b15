//! CLI argument parsing and configuration

use super::settings::{CacheKeyPolicy, Device, DEFAULT_MODEL};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// stemrhythm - Tempo, beat and structure analysis from separated stems
///
/// Builds 4-channel spectrograms from bass/drums/other/vocals stems and runs a
/// pretrained model over them to extract BPM, beats, downbeats and segments.
#[derive(Parser, Debug)]
#[command(name = "stemrhythm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only, no progress bars)
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze stem directories
    Analyze(AnalyzeArgs),
    /// Serve the analysis over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Stem-set directories, or roots containing stem-set directories
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Scan subdirectories recursively
    #[arg(short, long, default_value = "false")]
    pub recursive: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "STEMRHYTHM_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "STEMRHYTHM_PORT")]
    pub port: u16,

    /// Directory for per-request scratch space (defaults to /dev/shm when present)
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Options shared by analysis and serving
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Directory to save per-track result JSON files
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Directory for spectrogram tensors
    #[arg(long, value_name = "DIR", default_value = "./spec")]
    pub spec_dir: PathBuf,

    /// Pretrained model name
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Inference device
    #[arg(long, value_enum, default_value_t = Device::Cpu)]
    pub device: Device,

    /// Include raw activations in the results
    #[arg(long, default_value = "false")]
    pub activations: bool,

    /// Include raw embeddings in the results
    #[arg(long, default_value = "false")]
    pub embeddings: bool,

    /// Keep spectrograms after analysis
    #[arg(long, default_value = "false")]
    pub keep_byproducts: bool,

    /// Re-analyze tracks that already have results in the output directory
    #[arg(long, default_value = "false")]
    pub overwrite: bool,

    /// Extract spectrograms sequentially instead of on a worker pool
    #[arg(long, default_value = "false")]
    pub no_multiprocess: bool,

    /// Number of extraction workers (defaults to CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// How spectrogram file names are derived from stem directories
    #[arg(long, value_enum, default_value_t = CacheKeyPolicy::DirName)]
    pub cache_key: CacheKeyPolicy,
}

impl Cli {
    /// Get the log filter based on verbosity flags
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
