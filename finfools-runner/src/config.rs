//! Paths and settings.
//!
//! The base directory comes from `FINFOOLSERRAND_BASE` (default `./data`).
//! Under it:
//! - `raw/{source}/{YYYYMMDD}.csv`: per-day source files
//! - `snapshots/{source}/{YYYYMMDD}.snap`: converted snapshots
//! - `sessions/{name}.session` + `{name}.meta.json`
//! - `finfools.toml`: load filters and sources

use finfools_core::{FilterRegistry, LoadFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::source::{CsvDirSource, DataSource, DataSrcType};

pub const BASE_ENV: &str = "FINFOOLSERRAND_BASE";
pub const DEFAULT_BASE: &str = "./data";
pub const CONFIG_FILE: &str = "finfools.toml";

/// Directory layout under the base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base from `FINFOOLSERRAND_BASE`, else `./data`.
    pub fn from_env() -> Self {
        match std::env::var_os(BASE_ENV) {
            Some(base) if !base.is_empty() => Self::new(base),
            _ => Self::new(DEFAULT_BASE),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn raw_dir(&self, source: &str) -> PathBuf {
        self.base.join("raw").join(source)
    }

    pub fn snapshot_dir(&self, source: &str) -> PathBuf {
        self.base.join("snapshots").join(source)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join(CONFIG_FILE)
    }
}

/// One configured data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub src_type: DataSrcType,
    pub data_keys: Vec<String>,
    /// `alias → canonical` entries registered when the source's keys load.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn build(&self, paths: &Paths) -> Box<dyn DataSource> {
        Box::new(CsvDirSource::new(
            self.name.clone(),
            self.src_type,
            self.data_keys.clone(),
            paths.raw_dir(&self.name),
            paths.snapshot_dir(&self.name),
        ))
    }
}

fn default_sources() -> Vec<SourceConfig> {
    let aliases = |pairs: &[(&str, &str)]| {
        pairs
            .iter()
            .map(|(a, c)| (a.to_string(), c.to_string()))
            .collect()
    };
    vec![
        SourceConfig {
            name: "mf".into(),
            src_type: DataSrcType::Mf,
            data_keys: vec!["nav".into()],
            aliases: aliases(&[("data", "nav"), ("close", "nav")]),
        },
        SourceConfig {
            name: "stock".into(),
            src_type: DataSrcType::Stock,
            data_keys: ["open", "high", "low", "close", "volume"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            aliases: aliases(&[("data", "close")]),
        },
    ]
}

fn default_entities() -> usize {
    4096
}

fn default_dates() -> usize {
    512
}

/// Non-filter part of `finfools.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SettingsFile {
    #[serde(default = "default_sources")]
    sources: Vec<SourceConfig>,
    #[serde(default = "default_entities")]
    initial_entities: usize,
    #[serde(default = "default_dates")]
    initial_dates: usize,
}

/// Serialized form; plain values precede tables.
#[derive(Serialize)]
struct SettingsOut<'a> {
    active_filter: &'a str,
    initial_entities: usize,
    initial_dates: usize,
    filters: &'a BTreeMap<String, LoadFilter>,
    sources: &'a [SourceConfig],
}

/// Everything `finfools.toml` configures.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub filters: FilterRegistry,
    pub sources: Vec<SourceConfig>,
    /// Initial store capacity; the store grows past it as needed.
    pub initial_entities: usize,
    pub initial_dates: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filters: FilterRegistry::default(),
            sources: default_sources(),
            initial_entities: default_entities(),
            initial_dates: default_dates(),
        }
    }
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let filters = FilterRegistry::from_toml(content).map_err(ConfigError::Invalid)?;
        let file: SettingsFile =
            toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(bad) = file.sources.iter().find(|s| s.data_keys.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "source '{}' declares no data keys",
                bad.name
            )));
        }
        Ok(Self {
            filters,
            sources: file.sources,
            initial_entities: file.initial_entities,
            initial_dates: file.initial_dates,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Settings from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let out = SettingsOut {
            active_filter: &self.filters.active_filter,
            initial_entities: self.initial_entities,
            initial_dates: self.initial_dates,
            filters: &self.filters.filters,
            sources: &self.sources,
        };
        toml::to_string_pretty(&out).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io)?;
        }
        fs::write(path, self.to_toml()?).map_err(io)
    }

    /// Sources serving `wanted`.
    pub fn sources_for(&self, wanted: DataSrcType) -> Vec<&SourceConfig> {
        self.sources
            .iter()
            .filter(|s| s.src_type.serves(wanted))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finfools_core::NO_FILTER;

    const SAMPLE: &str = r#"
active_filter = "equity"
initial_entities = 64

[filters.equity]
white_list_types = ["open equity"]
black_list_names = ["bonus"]

[[sources]]
name = "amfi"
src_type = "mf"
data_keys = ["nav"]
aliases = { data = "nav" }
"#;

    #[test]
    fn parses_filters_and_sources() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        assert_eq!(settings.filters.active_name(), "equity");
        assert!(settings.filters.get(NO_FILTER).is_some());
        assert_eq!(settings.sources.len(), 1);
        assert_eq!(settings.sources[0].aliases["data"], "nav");
        assert_eq!(settings.initial_entities, 64);
        assert_eq!(settings.initial_dates, 512);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sources_for(DataSrcType::Any).len(), 2);
        assert_eq!(settings.sources_for(DataSrcType::Mf)[0].name, "mf");
    }

    #[test]
    fn rejects_unknown_active_filter_and_keyless_source() {
        assert!(Settings::from_toml("active_filter = \"nope\"").is_err());
        let bad = "[[sources]]\nname = \"x\"\nsrc_type = \"any\"\ndata_keys = []\n";
        assert!(matches!(
            Settings::from_toml(bad),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let mut settings = Settings::from_toml(SAMPLE).unwrap();
        assert!(settings.filters.set_active(NO_FILTER));
        settings.save(&paths.config_file()).unwrap();
        let back = Settings::load_or_default(&paths.config_file()).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn layout_under_base() {
        let paths = Paths::new("/tmp/ff");
        assert_eq!(paths.snapshot_dir("mf"), PathBuf::from("/tmp/ff/snapshots/mf"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/ff/finfools.toml"));
    }
}
