//! Runtime configuration settings

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default pretrained model
pub const DEFAULT_MODEL: &str = "harmonix-all";

/// How a stem set's spectrogram file name is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum CacheKeyPolicy {
    /// Directory basename; distinct directories with equal names share an entry
    #[default]
    DirName,
    /// Basename plus a hash of the full path
    PathHash,
}

/// Compute device for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

/// Runtime settings for the analysis pipeline
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory for per-track result JSON files (results are not saved when unset)
    pub out_dir: Option<PathBuf>,
    /// Directory for spectrogram tensors
    pub spec_dir: PathBuf,
    /// Pretrained model name
    pub model: String,
    /// Inference device
    pub device: Device,
    /// Include raw activations in results
    pub include_activations: bool,
    /// Include raw embeddings in results
    pub include_embeddings: bool,
    /// Keep spectrograms after inference
    pub keep_byproducts: bool,
    /// Re-analyze tracks that already have a result in `out_dir`
    pub overwrite: bool,
    /// Extract spectrograms on a worker pool
    pub multiprocess: bool,
    /// Worker pool size
    pub threads: usize,
    /// Spectrogram file naming
    pub cache_key: CacheKeyPolicy,
    /// Show progress bars
    pub show_progress: bool,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_args(args: &super::cli::ModelArgs) -> Self {
        Self {
            out_dir: args.out_dir.clone(),
            spec_dir: args.spec_dir.clone(),
            model: args.model.clone(),
            device: args.device,
            include_activations: args.activations,
            include_embeddings: args.embeddings,
            keep_byproducts: args.keep_byproducts,
            overwrite: args.overwrite,
            multiprocess: !args.no_multiprocess,
            threads: args.threads.unwrap_or_else(num_cpus::get).max(1),
            cache_key: args.cache_key,
            show_progress: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            out_dir: None,
            spec_dir: PathBuf::from("./spec"),
            model: DEFAULT_MODEL.to_string(),
            device: Device::Cpu,
            include_activations: false,
            include_embeddings: false,
            keep_byproducts: false,
            overwrite: false,
            multiprocess: true,
            threads: num_cpus::get().max(1),
            cache_key: CacheKeyPolicy::DirName,
            show_progress: true,
        }
    }
}
