use super::Project;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct HashArgs {
    /// Files to hash
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn hash(args: HashArgs, config_path: &Path) -> Result<()> {
    let project = Project::open(config_path, false)?;
    let cwd = std::env::current_dir()?;

    for file in &args.files {
        let absolute = std::fs::canonicalize(cwd.join(file))?;
        let status = project.model.hash_file(&absolute)?;
        println!("{:016x}  {}", status.hash, file.display().to_string().bright_white());
    }

    project.close()
}
