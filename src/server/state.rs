use crate::analysis::traits::RhythmModel;
use crate::config::Settings;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::ServerConfig;

pub type GuardedModel = Arc<Mutex<Box<dyn RhythmModel>>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub model: GuardedModel,
    pub http: reqwest::Client,
}

impl ServerState {
    pub fn new(config: ServerConfig, model: Box<dyn RhythmModel>) -> Self {
        Self {
            config,
            model: Arc::new(Mutex::new(model)),
            http: reqwest::Client::new(),
        }
    }

    /// Pipeline settings for one request working inside `scratch`
    pub fn request_settings(&self, scratch: &Path) -> Settings {
        Settings {
            out_dir: None,
            spec_dir: scratch.join("spec"),
            keep_byproducts: false,
            overwrite: true,
            show_progress: false,
            ..self.config.settings.clone()
        }
    }

    pub fn scratch_dir(&self) -> &PathBuf {
        &self.config.scratch_dir
    }
}
