use super::Project;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use plasma_workspace::{FileChangedEvent, FileEventType, FolderChangedEvent, FolderEventType};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Polling interval in milliseconds
    #[arg(long, default_value = "250")]
    pub interval: u64,
}

fn print_file_event(event: &FileChangedEvent) {
    let Some(path) = &event.path else {
        return;
    };
    let path = path.data_dir_relative();
    match event.event_type {
        FileEventType::FileAdded => println!("  {} {}", "+".green(), path),
        FileEventType::FileChanged => println!("  {} {}", "~".yellow(), path),
        FileEventType::FileRemoved => println!("  {} {}", "-".red(), path),
        _ => {}
    }
}

fn print_folder_event(event: &FolderChangedEvent) {
    let Some(path) = &event.path else {
        return;
    };
    match event.event_type {
        FolderEventType::FolderAdded => println!("  {} {}/", "+".green(), path.data_dir_relative()),
        FolderEventType::FolderRemoved => println!("  {} {}/", "-".red(), path.data_dir_relative()),
        FolderEventType::ModelReset => {}
    }
}

pub fn watch(args: WatchArgs, config_path: &Path) -> Result<()> {
    let project = Project::open(config_path, true)?;
    let model = &project.model;
    if !model.is_watching() {
        return Err(anyhow!("File watching is disabled or unavailable for this project"));
    }

    model.check_file_system()?;
    println!(
        "{} {} files in {} folders",
        "👀 Watching".bright_blue().bold(),
        model.file_count(),
        model.folder_count()
    );
    println!("Press Ctrl+C to stop");

    model.subscribe_file_events(Arc::new(print_file_event));
    model.subscribe_folder_events(Arc::new(print_folder_event));

    loop {
        model.process_watcher_events();
        std::thread::sleep(Duration::from_millis(args.interval));
    }
}
