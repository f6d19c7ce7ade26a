use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::CurateError;

pub const DEFAULT_CONFIG_FILE: &str = "mebold-curate.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub dataset_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub sourcedata_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub archive_pattern: Option<String>,
    #[serde(default)]
    pub noise_volumes: Option<usize>,
    #[serde(default)]
    pub full_run_lengths: Option<Vec<usize>>,
    #[serde(default)]
    pub noise_suffix: Option<String>,
    #[serde(default)]
    pub bold_acq_prefix: Option<String>,
    #[serde(default)]
    pub fmap_acq_prefix: Option<String>,
    #[serde(default)]
    pub drop_keys: Option<Vec<String>>,
}

/// Noise-split policy for multi-echo BOLD runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPolicy {
    pub noise_volumes: usize,
    pub full_run_lengths: Vec<usize>,
    pub noise_suffix: String,
}

impl SplitPolicy {
    pub fn is_full_run(&self, n_vols: usize) -> bool {
        self.full_run_lengths.contains(&n_vols)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub dataset_root: Option<Utf8PathBuf>,
    pub sourcedata_root: Option<Utf8PathBuf>,
    pub archive_pattern: String,
    pub split: SplitPolicy,
    pub bold_acq_prefix: String,
    pub fmap_acq_prefix: String,
    pub drop_keys: Vec<String>,
}

impl ResolvedConfig {
    pub fn dataset_root(&self) -> Result<&Utf8Path, CurateError> {
        self.dataset_root
            .as_deref()
            .ok_or(CurateError::MissingDatasetRoot)
    }

    pub fn sourcedata_root(&self) -> Result<&Utf8Path, CurateError> {
        self.sourcedata_root
            .as_deref()
            .ok_or(CurateError::MissingSourcedataRoot)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            dataset_root: None,
            sourcedata_root: None,
            archive_pattern: DEFAULT_ARCHIVE_PATTERN.to_string(),
            split: SplitPolicy {
                noise_volumes: DEFAULT_NOISE_VOLUMES,
                full_run_lengths: default_full_run_lengths(),
                noise_suffix: DEFAULT_NOISE_SUFFIX.to_string(),
            },
            bold_acq_prefix: DEFAULT_BOLD_ACQ_PREFIX.to_string(),
            fmap_acq_prefix: DEFAULT_FMAP_ACQ_PREFIX.to_string(),
            drop_keys: default_drop_keys(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `mebold-curate.json` from the working directory when it
    /// exists. Without either, the built-in defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CurateError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CurateError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CurateError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CurateError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(CurateError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let noise_volumes = config.noise_volumes.unwrap_or(DEFAULT_NOISE_VOLUMES);
        if noise_volumes == 0 {
            return Err(CurateError::InvalidConfig(
                "noise_volumes must be at least 1".to_string(),
            ));
        }

        let full_run_lengths = config
            .full_run_lengths
            .unwrap_or_else(default_full_run_lengths);
        if let Some(short) = full_run_lengths.iter().find(|len| **len <= noise_volumes) {
            return Err(CurateError::InvalidConfig(format!(
                "full run length {short} does not exceed noise_volumes {noise_volumes}"
            )));
        }

        let noise_suffix = config
            .noise_suffix
            .unwrap_or_else(|| DEFAULT_NOISE_SUFFIX.to_string());
        if noise_suffix.is_empty() || !noise_suffix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(CurateError::InvalidConfig(format!(
                "noise_suffix must be alphanumeric: {noise_suffix:?}"
            )));
        }

        let archive_pattern = config
            .archive_pattern
            .unwrap_or_else(|| DEFAULT_ARCHIVE_PATTERN.to_string());
        glob::Pattern::new(&archive_pattern)
            .map_err(|err| CurateError::InvalidConfig(format!("archive_pattern: {err}")))?;

        Ok(ResolvedConfig {
            schema_version,
            dataset_root: config.dataset_root,
            sourcedata_root: config.sourcedata_root,
            archive_pattern,
            split: SplitPolicy {
                noise_volumes,
                full_run_lengths,
                noise_suffix,
            },
            bold_acq_prefix: config
                .bold_acq_prefix
                .unwrap_or_else(|| DEFAULT_BOLD_ACQ_PREFIX.to_string()),
            fmap_acq_prefix: config
                .fmap_acq_prefix
                .unwrap_or_else(|| DEFAULT_FMAP_ACQ_PREFIX.to_string()),
            drop_keys: config.drop_keys.unwrap_or_else(default_drop_keys),
        })
    }
}

pub const DEFAULT_ARCHIVE_PATTERN: &str = "*_*/*/*/*.dicom.zip";
pub const DEFAULT_NOISE_VOLUMES: usize = 3;
pub const DEFAULT_NOISE_SUFFIX: &str = "noRF";
pub const DEFAULT_BOLD_ACQ_PREFIX: &str = "MBME";
pub const DEFAULT_FMAP_ACQ_PREFIX: &str = "ME";

pub fn default_full_run_lengths() -> Vec<usize> {
    vec![240, 204, 200]
}

pub fn default_drop_keys() -> Vec<String> {
    vec![
        "AcquisitionTime".to_string(),
        "CogAtlasID".to_string(),
        "InstitutionAddress".to_string(),
        "TaskName".to_string(),
        "ImageComments".to_string(),
    ]
}
