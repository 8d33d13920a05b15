//! Pretrained model registry and weight file resolution
//!
//! Every fold of the Harmonix model ships as one ONNX file. The `harmonix-all`
//! ensemble loads all eight folds.
//! Weight resolution checks multiple common locations automatically.

use crate::error::{Result, StemrhythmError};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Number of cross-validation folds in the Harmonix ensemble
pub const NUM_FOLDS: usize = 8;

/// Name of the ensemble over every fold
pub const ENSEMBLE_NAME: &str = "harmonix-all";

/// Environment variable pointing at a directory of model files
pub const MODEL_DIR_ENV: &str = "STEMRHYTHM_MODEL_DIR";

/// Every model name `load_pretrained_model` accepts
pub fn available_models() -> Vec<String> {
    std::iter::once(ENSEMBLE_NAME.to_string())
        .chain((0..NUM_FOLDS).map(fold_name))
        .collect()
}

fn fold_name(fold: usize) -> String {
    format!("harmonix-fold{}", fold)
}

/// Fold names that make up a pretrained model
pub fn resolve_folds(name: &str) -> Result<Vec<String>> {
    if name == ENSEMBLE_NAME {
        return Ok((0..NUM_FOLDS).map(fold_name).collect());
    }

    let valid = name
        .strip_prefix("harmonix-fold")
        .and_then(|n| n.parse::<usize>().ok())
        .is_some_and(|n| n < NUM_FOLDS && name == fold_name(n));
    if valid {
        return Ok(vec![name.to_string()]);
    }

    Err(StemrhythmError::UnknownModel {
        name: name.to_string(),
        available: available_models().join(", "),
    })
}

/// ONNX file name of one fold
pub fn model_file_name(fold: &str) -> String {
    format!("{}.onnx", fold)
}

/// Find a model file by checking multiple common locations
///
/// Search order:
/// 1. `STEMRHYTHM_MODEL_DIR` environment variable
/// 2. ProjectDirs cache: ~/.cache/stemrhythm/models/ (Linux)
/// 3. ProjectDirs data: ~/.local/share/stemrhythm/models/ (Linux XDG)
/// 4. Current directory: ./models/
/// 5. Home directory: ~/stemrhythm/models/
pub fn find_model_path(file_name: &str) -> Result<PathBuf> {
    let mut checked_locations: Vec<String> = Vec::new();

    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        let env_path = PathBuf::from(dir).join(file_name);
        if env_path.exists() {
            return Ok(env_path);
        }
        checked_locations.push(format!("{}={}", MODEL_DIR_ENV, env_path.display()));
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "stemrhythm", "stemrhythm") {
        for base in [proj_dirs.cache_dir(), proj_dirs.data_dir()] {
            let path = base.join("models").join(file_name);
            if path.exists() {
                return Ok(path);
            }
            checked_locations.push(path.display().to_string());
        }
    }

    let cwd_path = PathBuf::from("./models").join(file_name);
    if cwd_path.exists() {
        return Ok(cwd_path.canonicalize().unwrap_or(cwd_path));
    }
    checked_locations.push(cwd_path.display().to_string());

    if let Some(base_dirs) = directories::BaseDirs::new() {
        let home_path = base_dirs
            .home_dir()
            .join("stemrhythm")
            .join("models")
            .join(file_name);
        if home_path.exists() {
            return Ok(home_path);
        }
        checked_locations.push(home_path.display().to_string());
    }

    let locations_list = checked_locations
        .iter()
        .map(|loc| format!("  - {}", loc))
        .collect::<Vec<_>>()
        .join("\n");

    Err(StemrhythmError::ModelUnavailable {
        reason: format!(
            "Model file '{}' not found.\n\n\
             Locations checked:\n{}\n\n\
             To fix this, either:\n\
             1. Set the environment variable:\n\
                export {}=/path/to/models\n\n\
             2. Or place the model in one of the above locations.",
            file_name, locations_list, MODEL_DIR_ENV
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_models() {
        let models = available_models();
        assert_eq!(models.len(), 9);
        assert_eq!(models[0], "harmonix-all");
        assert_eq!(models[8], "harmonix-fold7");
    }

    #[test]
    fn test_ensemble_resolves_to_all_folds() {
        let folds = resolve_folds("harmonix-all").unwrap();
        assert_eq!(folds.len(), NUM_FOLDS);
        assert_eq!(folds[3], "harmonix-fold3");
    }

    #[test]
    fn test_single_fold() {
        assert_eq!(resolve_folds("harmonix-fold5").unwrap(), vec!["harmonix-fold5"]);
    }

    #[test]
    fn test_unknown_models_rejected() {
        for name in ["harmonix-fold8", "harmonix-fold05", "harmonix", "beat-this"] {
            match resolve_folds(name) {
                Err(StemrhythmError::UnknownModel { available, .. }) => {
                    assert!(available.contains("harmonix-all"));
                }
                other => panic!("expected UnknownModel for {}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_missing_model_lists_locations() {
        let err = find_model_path("definitely-not-a-model-file.onnx").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("definitely-not-a-model-file.onnx"));
        assert!(message.contains("Locations checked"));
    }
}
