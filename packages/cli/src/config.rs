use plasma_workspace::FileSystemConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "plasma.config.json";

/// Plasma project file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Data directories, watcher and casing options
    #[serde(flatten)]
    pub file_system: FileSystemConfig,

    /// Where the file status cache is kept, relative to the project
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

fn default_cache_file() -> String {
    ".plasma/fs-cache.json".to_string()
}

impl Config {
    /// Load `path`, or the default config if it doesn't exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Config file to use: `explicit` if given, otherwise the default name in `cwd`
    pub fn locate(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_NAME))
    }

    /// File system config with data directories made absolute against `project_dir`
    pub fn resolved_file_system(&self, project_dir: &Path) -> FileSystemConfig {
        let mut config = self.file_system.clone();
        config.data_dirs = config
            .data_dirs
            .iter()
            .map(|dir| project_dir.join(dir))
            .collect();
        config
    }

    pub fn get_cache_file(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.cache_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_system: FileSystemConfig::with_data_dirs(vec![PathBuf::from("data")]),
            cache_file: default_cache_file(),
        }
    }
}
