use std::{collections::BTreeMap, env, path::PathBuf, time::Duration};

use directories::{BaseDirs, ProjectDirs};
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::core::{Language, StopwordSet, Translatable};

const CONFIG: &str = include_str!("../.config/config.json5");

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    /// Quiet period after the last keystroke before a query is evaluated
    pub debounce_ms: u64,
    /// Position of the type-bearing cell in every row
    pub type_column: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            type_column: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct VisualizationConfig {
    pub stopword_languages: Vec<Language>,
    /// Word cloud size limit
    pub max_words: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            stopword_languages: Language::all(),
            max_words: 200,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub locale: String,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub visualization: VisualizationConfig,
    /// Descriptions of the type-bearing cell values, keyed by value
    #[serde(default)]
    pub data_types: BTreeMap<String, Translatable>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: "nl".to_string(),
            search: SearchConfig::default(),
            visualization: VisualizationConfig::default(),
            data_types: BTreeMap::new(),
        }
    }
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

impl Config {
    /// Load configuration: embedded defaults, then the user file, then the
    /// `CONSENTVIEW_*` environment
    ///
    /// An explicit `config_path` must exist; the default location is optional.
    pub fn from_path(config_path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let user_file = match config_path {
            Some(p) => config::File::from(expand_tilde(p))
                .format(config::FileFormat::Json5)
                .required(true),
            None => config::File::from(get_config_dir().join("config.json5"))
                .format(config::FileFormat::Json5)
                .required(false),
        };
        Self::build(Some(user_file), environment())
    }

    fn build(
        user_file: Option<config::File<config::FileSourceFile, config::FileFormat>>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5));
        if let Some(file) = user_file {
            builder = builder.add_source(file);
        }
        builder.add_source(environment).build()?.try_deserialize()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.search.debounce_ms)
    }

    pub fn stopwords(&self) -> StopwordSet {
        StopwordSet::new(&self.visualization.stopword_languages)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(&PROJECT_NAME)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Some(s) = path.to_str() {
        if s.starts_with("~") {
            if let Some(base) = BaseDirs::new() {
                return PathBuf::from(s.replacen("~", base.home_dir().to_str().unwrap_or(""), 1));
            }
        }
    }
    path.clone()
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(dirs) = ProjectDirs::from("", "", env!("CARGO_PKG_NAME")) {
        dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}
