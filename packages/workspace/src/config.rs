use crate::path::Casing;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_watch() -> bool {
    true
}

/// Data directories and behavior of a [`crate::FileSystemModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemConfig {
    /// Ordered data directory roots; earlier roots win for nested paths.
    #[serde(default)]
    pub data_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub casing: Casing,

    /// Install a file watcher on the data directories.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            data_dirs: Vec::new(),
            casing: Casing::platform_default(),
            watch: true,
        }
    }
}

impl FileSystemConfig {
    pub fn with_data_dirs(data_dirs: Vec<PathBuf>) -> Self {
        Self {
            data_dirs,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json_defaults() {
        let config: FileSystemConfig = serde_json::from_str(r#"{ "dataDirs": ["/data"] }"#).unwrap();
        assert_eq!(config.data_dirs, vec![PathBuf::from("/data")]);
        assert!(config.watch);
        assert_eq!(config.casing, Casing::platform_default());
    }

    #[test]
    fn test_config_casing_names() {
        let config: FileSystemConfig =
            serde_json::from_str(r#"{ "casing": "insensitive", "watch": false }"#).unwrap();
        assert_eq!(config.casing, Casing::Insensitive);
        assert!(!config.watch);
    }
}
