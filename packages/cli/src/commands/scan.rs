use super::Project;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use plasma_workspace::FileSystemModelError;
use std::path::Path;

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Also hash every file (cached hashes are reused)
    #[arg(long)]
    pub hash: bool,

    /// Print every file with its status
    #[arg(short, long)]
    pub list: bool,
}

pub fn scan(args: ScanArgs, config_path: &Path) -> Result<()> {
    let project = Project::open(config_path, false)?;
    let model = &project.model;

    println!("{}", "🔍 Scanning data directories...".bright_blue().bold());
    for dir in model.data_dirs() {
        println!("  {}", dir.display());
    }
    model.check_file_system()?;

    let mut locked = 0;
    if args.hash {
        for path in model.files().keys() {
            match model.hash_file(path.path()) {
                Ok(_) => {}
                Err(FileSystemModelError::FileLocked(_)) => {
                    locked += 1;
                    println!("  {} {} is locked", "⚠️".yellow(), path.data_dir_relative());
                }
                Err(e) => println!("  {} {} - {}", "✗".red(), path.data_dir_relative(), e),
            }
        }
    }

    if args.list {
        for (path, status) in model.files() {
            let hash = if status.hash == 0 {
                "-".dimmed().to_string()
            } else {
                format!("{:016x}", status.hash)
            };
            println!(
                "  {} {} {}",
                hash,
                path.data_dir_relative(),
                status.last_modified.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
        }
    }

    println!();
    println!(
        "{} {} files in {} folders",
        "✨".green(),
        model.file_count(),
        model.folder_count()
    );
    if locked > 0 {
        println!("{} {} files could not be read", "⚠️".yellow(), locked);
    }

    project.close()
}
