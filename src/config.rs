use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{cascade::DEFAULT_SETTLE_DELAY_SECS, params::AbilityParameters, recursion::DEFAULT_MAX_DEPTH};

/// File name looked up in the working directory, then in the user config dir.
pub const CONFIG_FILE_NAME: &str = "chain_lightning.ron";

/// Tuning for the chain engine and the default ability it fires.
///
/// Every field has a default, so a file only needs to mention what it
/// changes:
///
/// ```ron
/// (
///     max_depth: 3,
///     ability: (base_damage: 25.0, range: 200.0),
/// )
/// ```
#[derive(Resource, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChainLightningConfig {
    /// Ceiling on cascade depth, shared by every chain in flight.
    pub max_depth: u32,
    /// Pause between a carrier dying and its own chain firing.
    pub settle_delay_secs: f64,
    /// How long a dead entity stays around before it is despawned.
    pub death_linger_secs: f64,
    /// Fixed seed for reproducible runs. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
    pub ability: AbilityParameters,
}

impl Default for ChainLightningConfig {
    fn default() -> Self {
        ChainLightningConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            settle_delay_secs: DEFAULT_SETTLE_DELAY_SECS,
            death_linger_secs: 0.5,
            rng_seed: None,
            ability: AbilityParameters::default(),
        }
    }
}

impl ChainLightningConfig {
    pub fn settle_delay(&self) -> Duration {
        seconds(self.settle_delay_secs)
    }

    pub fn death_linger(&self) -> Duration {
        seconds(self.death_linger_secs)
    }

    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(contents)?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&contents)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}

/// Longest delay a config file can ask for.
pub const MAX_DELAY_SECS: f64 = 3600.0;

// Hand-edited files can hold NaN, negatives or `inf`; none of them may panic.
fn seconds(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs.clamp(0.0, MAX_DELAY_SECS))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse chain lightning config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not serialize chain lightning config: {0}")]
    Serialize(#[from] ron::Error),
}

mod storage {
    use std::path::{Path, PathBuf};

    use bevy::prelude::*;

    use super::{ChainLightningConfig, CONFIG_FILE_NAME};

    /// Where to look, in order: the working directory, then the per-user
    /// config directory.
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("chain-cascade").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// First config that exists and parses. A file that exists but is broken
    /// is reported and skipped.
    pub fn load(paths: &[PathBuf]) -> Option<ChainLightningConfig> {
        for path in paths {
            if !path.exists() {
                continue;
            }
            match ChainLightningConfig::load_from(path) {
                Ok(config) => {
                    info!("Loaded chain lightning config from {:?}", path);
                    return Some(config);
                }
                Err(e) => error!("{}. Ignoring it.", e),
            }
        }
        None
    }

    pub fn save(config: &ChainLightningConfig, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Failed to create config directory: {}", e);
                return;
            }
        }

        match config.to_ron() {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(path, serialized) {
                    error!("Failed to write config file: {}", e);
                } else {
                    info!("Chain lightning config written to {:?}", path);
                }
            }
            Err(e) => error!("{}", e),
        }
    }
}

/// PreStartup system: loads the config from disk unless one was inserted
/// already, falling back to defaults.
pub fn load_config(mut commands: Commands, existing: Option<Res<ChainLightningConfig>>) {
    if existing.is_some() {
        debug!("Chain lightning config provided by the app, not reading disk");
        return;
    }

    let config = storage::load(&storage::candidate_paths()).unwrap_or_else(|| {
        info!("No chain lightning config found. Using defaults.");
        ChainLightningConfig::default()
    });
    commands.insert_resource(config);
}

/// Writes `config` to `path` as pretty RON, logging instead of failing.
pub fn save_config(config: &ChainLightningConfig, path: &Path) {
    storage::save(config, path);
}
