use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AdvanceError;
use crate::reconcile::{ReconcileOptions, DEFAULT_MIN_SIMILARITY};

fn default_similarity_threshold() -> f64 {
    DEFAULT_MIN_SIMILARITY
}

fn default_collapse_completed() -> bool {
    true
}

/// User settings read from the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Minimum description similarity for a `likely` match
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Start the tree view with fully completed groups collapsed
    #[serde(default = "default_collapse_completed")]
    pub collapse_completed: bool,
    /// Progress file used when a command is not given one
    #[serde(default)]
    pub progress_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            collapse_completed: default_collapse_completed(),
            progress_file: None,
        }
    }
}

impl Settings {
    /// Loads settings from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings, writing a default file first if none exists
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            log::info!("creating default config at {:?}", path.as_ref());
            let settings = Settings::default();
            settings.save(&path)?;
            return Ok(settings);
        }
        Self::load(path)
    }

    /// Save the settings to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), AdvanceError> {
        let t = self.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(AdvanceError::InvalidConfig {
                field: "similarity_threshold".to_string(),
                reason: format!("{} is outside [0, 1]", t),
            });
        }
        Ok(())
    }

    /// Replaces the threshold, rejecting out-of-range values
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, AdvanceError> {
        self.similarity_threshold = threshold;
        self.validate()?;
        Ok(self)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            min_similarity: self.similarity_threshold,
        }
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("ADVANCE_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    // Default to ~/.advance.config
    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

    Ok(home_dir.join(".advance.config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_file_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("advance.config");

        let settings = Settings::load_or_create(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("advance.config");
        fs::write(&path, "progress_file: progress/alex.yaml\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.similarity_threshold, 0.5);
        assert!(settings.collapse_completed);
        assert_eq!(
            settings.progress_file,
            Some(PathBuf::from("progress/alex.yaml"))
        );
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("advance.config");
        fs::write(&path, "similarity_threshold: 1.5\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AdvanceError>(),
            Some(AdvanceError::InvalidConfig { field, .. }) if field == "similarity_threshold"
        ));

        assert!(Settings::default().with_threshold(-0.1).is_err());
        assert!(Settings::default().with_threshold(f64::NAN).is_err());
        let tuned = Settings::default().with_threshold(0.3).unwrap();
        assert_eq!(tuned.reconcile_options().min_similarity, 0.3);
    }
}
