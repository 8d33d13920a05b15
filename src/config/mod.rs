//! Configuration and CLI handling

pub mod cli;
pub mod settings;

pub use cli::{AnalyzeArgs, Cli, Command, ModelArgs, ServeArgs};
pub use settings::{CacheKeyPolicy, Device, Settings, DEFAULT_MODEL};
