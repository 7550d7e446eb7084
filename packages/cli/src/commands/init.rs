use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use plasma_workspace::FileSystemConfig;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Data directories to track
    #[arg(short, long = "data-dir", default_value = "data")]
    pub data_dirs: Vec<String>,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, config_path: &Path) -> Result<()> {
    let project_dir = config_path.parent().unwrap_or(Path::new("."));

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing Plasma project...".bright_blue().bold());

    for data_dir in &args.data_dirs {
        let path = project_dir.join(data_dir);
        if !path.exists() {
            fs::create_dir_all(&path)?;
            println!("  {} Created {}/", "✓".green(), data_dir);
        }
    }

    let config = Config {
        file_system: FileSystemConfig::with_data_dirs(args.data_dirs.iter().map(PathBuf::from).collect()),
        ..Config::default()
    };
    fs::write(config_path, serde_json::to_string_pretty(&config)?)?;

    println!("  {} Created {}", "✓".green(), config_path.display());
    println!();
    println!("{}", "✅ Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Put files into {}/", args.data_dirs.join("/, "));
    println!("  2. Run: plasma scan --hash");
    println!("  3. Run: plasma watch");

    Ok(())
}
