pub mod hash;
pub mod init;
pub mod scan;
pub mod watch;

pub use hash::{hash, HashArgs};
pub use init::{init, InitArgs};
pub use scan::{scan, ScanArgs};
pub use watch::{watch, WatchArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use plasma_workspace::{FileSystemCache, FileSystemModel};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A project opened from its config file: the config, the directory it
/// lives in, and a model seeded from the status cache.
pub struct Project {
    pub config: Config,
    pub dir: PathBuf,
    pub model: FileSystemModel,
}

impl Project {
    pub fn open(config_path: &Path, watch: bool) -> Result<Self> {
        let config = Config::load(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let dir = config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut fs_config = config.resolved_file_system(&dir);
        fs_config.watch = watch && fs_config.watch;

        let cache_file = config.get_cache_file(&dir);
        let (files, folders) = FileSystemCache::load(&cache_file)?.into_maps(fs_config.casing);
        debug!(cache = %cache_file.display(), cached_files = files.len(), "loaded status cache");

        let model = FileSystemModel::with_real_file_system();
        model
            .initialize(fs_config, files, folders)
            .context("Failed to open data directories (run `plasma init` first?)")?;

        Ok(Self { config, dir, model })
    }

    /// Persist the model's maps so the next run can reuse cached hashes
    pub fn close(self) -> Result<()> {
        let cache_file = self.config.get_cache_file(&self.dir);
        if let Some(parent) = cache_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (files, folders) = self.model.deinitialize();
        FileSystemCache::from_maps(&files, &folders).save(&cache_file)?;
        Ok(())
    }
}
