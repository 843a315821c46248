//! Typed run configuration.
//!
//! Three documents drive a run:
//!
//! | Struct            | File (default)     | Purpose                                  |
//! |-------------------|--------------------|------------------------------------------|
//! | [`Settings`]      | `settings.toml`    | step list, resume point, checkpoints, seed |
//! | [`NetworkSettings`] | `network_los.toml` | zone system, skims, MAZ→TAZ crosswalk  |
//! | model settings    | `<model>.toml`     | per-model; read via [`FileSystem::read_model_settings`] |
//!
//! [`FileSystem`] resolves those names against ordered config and data
//! directories.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CoreError, CoreResult};

// ── Checkpoint policy ─────────────────────────────────────────────────────────

/// Which steps write a checkpoint after they finish.
///
/// Accepts `checkpoints = true`, `checkpoints = false`, or an explicit list
/// of step names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckpointPolicy {
    All(bool),
    Only(Vec<String>),
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        CheckpointPolicy::All(true)
    }
}

impl CheckpointPolicy {
    pub fn should_save(&self, step: &str) -> bool {
        match self {
            CheckpointPolicy::All(all) => *all,
            CheckpointPolicy::Only(steps) => steps.iter().any(|s| s == step),
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// Global run settings (`settings.toml`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ordered step names to run.
    pub models:                         Vec<String>,
    /// Resume after this checkpoint (`"_"` means the last one).
    pub resume_after:                   Option<String>,
    pub checkpoints:                    CheckpointPolicy,
    /// Checkpoint store backend: `csv`, `sqlite`, `parquet`, or `memory`.
    pub checkpoint_format:              String,
    pub rng_base_seed:                  u64,
    /// Choosers per batch in interaction sampling; `0` means all at once.
    pub chunk_size:                     usize,
    /// Presample at TAZ level in two-zone systems.
    pub want_dest_choice_presampling:   bool,
    pub want_dest_choice_sample_tables: bool,
    /// Estimation mode: skip sampling and use the full alternative set.
    pub disable_destination_sampling:   bool,
    /// Keys this struct does not know about, kept for model code to inspect.
    #[serde(flatten)]
    pub other_settings:                 toml::Table,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models:                         Vec::new(),
            resume_after:                   None,
            checkpoints:                    CheckpointPolicy::default(),
            checkpoint_format:              "csv".into(),
            rng_base_seed:                  0,
            chunk_size:                     0,
            want_dest_choice_presampling:   true,
            want_dest_choice_sample_tables: false,
            disable_destination_sampling:   false,
            other_settings:                 toml::Table::new(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let settings: Settings = toml::from_str(s)?;
        for key in settings.other_settings.keys() {
            warn!(key = %key, "unrecognized setting kept in other_settings");
        }
        Ok(settings)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

// ── Network settings ──────────────────────────────────────────────────────────

/// Spatial resolution of the model region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ZoneSystem {
    /// TAZ only.
    OneZone,
    /// MAZs nested within TAZs; skims are TAZ-level.
    TwoZone,
}

impl TryFrom<u8> for ZoneSystem {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            1 => Ok(ZoneSystem::OneZone),
            2 => Ok(ZoneSystem::TwoZone),
            n => Err(format!("unsupported zone_system {n}")),
        }
    }
}

impl From<ZoneSystem> for u8 {
    fn from(z: ZoneSystem) -> u8 {
        match z {
            ZoneSystem::OneZone => 1,
            ZoneSystem::TwoZone => 2,
        }
    }
}

/// Level-of-service inputs (`network_los.toml`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub zone_system: ZoneSystem,
    /// Long-format TAZ skim file: `origin,destination,<skim>...`.
    pub taz_skims:   String,
    /// `MAZ,TAZ` crosswalk; required for two-zone systems.
    #[serde(default)]
    pub maz:         Option<String>,
}

impl NetworkSettings {
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let net: NetworkSettings = toml::from_str(s)?;
        if net.zone_system == ZoneSystem::TwoZone && net.maz.is_none() {
            return Err(CoreError::Config("two-zone system requires a 'maz' crosswalk file".into()));
        }
        Ok(net)
    }
}

// ── File system ───────────────────────────────────────────────────────────────

/// Directory layout of one model run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSystem {
    pub working_dir:        PathBuf,
    /// Searched in order; the first match wins.
    pub configs_dir:        Vec<PathBuf>,
    pub data_dir:           Vec<PathBuf>,
    pub output_dir:         PathBuf,
    pub settings_file_name: String,
    pub pipeline_file_name: String,
}

impl FileSystem {
    /// Conventional `configs/`, `data/`, `output/` layout under `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            configs_dir:        vec![working_dir.join("configs")],
            data_dir:           vec![working_dir.join("data")],
            output_dir:         working_dir.join("output"),
            settings_file_name: "settings.toml".into(),
            pipeline_file_name: "pipeline".into(),
            working_dir,
        }
    }

    fn search(dirs: &[PathBuf], name: &str, kind: &str) -> CoreResult<PathBuf> {
        dirs.iter()
            .map(|d| d.join(name))
            .find(|p| p.exists())
            .ok_or_else(|| CoreError::Config(format!("{kind} file '{name}' not found in {dirs:?}")))
    }

    pub fn get_config_file_path(&self, name: &str) -> CoreResult<PathBuf> {
        Self::search(&self.configs_dir, name, "config")
    }

    pub fn get_data_file_path(&self, name: &str) -> CoreResult<PathBuf> {
        Self::search(&self.data_dir, name, "data")
    }

    pub fn get_output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Checkpoint store location inside the output directory.
    pub fn get_pipeline_path(&self) -> PathBuf {
        self.output_dir.join(&self.pipeline_file_name)
    }

    pub fn read_settings(&self) -> CoreResult<Settings> {
        Settings::load(&self.get_config_file_path(&self.settings_file_name)?)
    }

    /// Read `<name>.toml` (or `name` if it already has an extension) from
    /// the config directories.
    pub fn read_model_settings<T: DeserializeOwned>(&self, name: &str) -> CoreResult<T> {
        let file = if Path::new(name).extension().is_some() {
            name.to_owned()
        } else {
            format!("{name}.toml")
        };
        let text = std::fs::read_to_string(self.get_config_file_path(&file)?)?;
        Ok(toml::from_str(&text)?)
    }
}
