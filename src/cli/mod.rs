use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;

pub mod commands;

use self::commands::{
    DeleteArgs, EditArgs, IdArgs, ListArgs, NewArgs, RenameArgs, SidebarArgs, ThemeArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "cleartype",
    version,
    about = "Distraction-free offline note editor"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over CLEARTYPE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over CLEARTYPE_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive editor (default)
    Tui,
    /// Create a new note, reading the body from stdin when piped
    New(NewArgs),
    /// List notes with their derived titles
    List(ListArgs),
    /// Print a note with its metadata
    Show(IdArgs),
    /// Make a note the active one
    Select(IdArgs),
    /// Replace a note's body
    Edit(EditArgs),
    /// Give a note an explicit title
    Rename(RenameArgs),
    /// Delete a note
    Delete(DeleteArgs),
    /// Print a note as plain text
    Export(IdArgs),
    /// Show or change the theme
    Theme(ThemeArgs),
    /// Show or change the sidebar state
    Sidebar(SidebarArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&config.storage)?;

    let config = Arc::new(config);
    let command = cli.command.unwrap_or(Commands::Tui);
    match command {
        Commands::Tui => {
            let mut app = App::new(config.clone(), storage)?;
            commands::run_tui(&mut app)
        }
        Commands::New(args) => commands::new_note(&config, storage, args),
        Commands::List(args) => commands::list_notes(&config, storage, args),
        Commands::Show(args) => commands::show_note(&config, storage, args),
        Commands::Select(args) => commands::select_note(&config, storage, args),
        Commands::Edit(args) => commands::edit_note(&config, storage, args),
        Commands::Rename(args) => commands::rename_note(&config, storage, args),
        Commands::Delete(args) => commands::delete_note(&config, storage, args),
        Commands::Export(args) => commands::export_note(&config, storage, args),
        Commands::Theme(args) => commands::theme(&config, storage, args),
        Commands::Sidebar(args) => commands::sidebar(storage, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn no_subcommand_means_tui() {
        let cli = Cli::parse_from(["cleartype"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn parses_rename_with_multiword_title() {
        let cli = Cli::parse_from(["cleartype", "rename", "abc123", "Weekly", "review"]);
        assert_matches!(
            cli.command,
            Some(Commands::Rename(ref args)) if args.id == "abc123" && args.title.join(" ") == "Weekly review"
        );
    }

    #[test]
    fn parses_list_sort_field() {
        let cli = Cli::parse_from(["cleartype", "--data-dir", "/tmp/ct", "list", "--sort", "title"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ct")));
        assert_matches!(
            cli.command,
            Some(Commands::List(ListArgs { sort: Some(crate::config::SortField::Title), .. }))
        );
    }
}
