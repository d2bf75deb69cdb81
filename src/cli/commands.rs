use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::config::{AppConfig, SortDirection, SortField, SortSpec, ThemeName};
use crate::feed::text::{count_words, format_date};
use crate::feed::{Environment, Feed, Item, SystemEnvironment};
use crate::journaling::AutoSaveEvent;
use crate::preferences::{Preferences, SidebarState};
use crate::storage::KeyValueStore;
use crate::workspace::Workspace;

const SHORT_ID_LEN: usize = 8;

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Explicit title; derived from the body when omitted
    #[arg(long)]
    pub title: Option<String>,
    /// Provide the body inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Sort by updated, created or title (defaults to the configured order)
    #[arg(long)]
    pub sort: Option<SortField>,
    /// Oldest or alphabetically first on top
    #[arg(long)]
    pub ascending: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Note identifier or a unique prefix of it
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier or a unique prefix of it
    pub id: String,
    /// New body. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RenameArgs {
    /// Note identifier or a unique prefix of it
    pub id: String,
    /// New title (words are joined with spaces)
    #[arg(required = true)]
    pub title: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier or a unique prefix of it
    pub id: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeChoice {
    Dark,
    Light,
    Toggle,
}

#[derive(Args, Debug, Clone)]
pub struct ThemeArgs {
    /// New theme; prints the current one when omitted
    #[arg(value_enum)]
    pub choice: Option<ThemeChoice>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarChoice {
    Open,
    Closed,
    Toggle,
}

#[derive(Args, Debug, Clone)]
pub struct SidebarArgs {
    /// New sidebar state; prints the current one when omitted
    #[arg(value_enum)]
    pub choice: Option<SidebarChoice>,
}

pub fn run_tui<S: KeyValueStore>(app: &mut App<S>) -> Result<()> {
    app.run()
}

pub fn new_note<S: KeyValueStore>(config: &AppConfig, storage: S, args: NewArgs) -> Result<()> {
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    let mut workspace = open_workspace(config, storage)?;
    let output = create_item(&mut workspace, args.title.as_deref(), &body);
    commit(workspace)?;
    print!("{output}");
    Ok(())
}

pub fn list_notes<S: KeyValueStore>(config: &AppConfig, storage: S, args: ListArgs) -> Result<()> {
    let workspace = open_workspace(config, storage)?;
    let mut spec = config.default_sort;
    if let Some(field) = args.sort {
        spec.field = field;
    }
    if args.ascending {
        spec.direction = SortDirection::Ascending;
    }
    print!("{}", format_list(workspace.snapshot(), spec));
    commit(workspace)
}

pub fn show_note<S: KeyValueStore>(config: &AppConfig, storage: S, args: IdArgs) -> Result<()> {
    let workspace = open_workspace(config, storage)?;
    let id = resolve_id(workspace.snapshot(), &args.id)?;
    let output = workspace
        .snapshot()
        .get(&id)
        .map(format_item)
        .unwrap_or_default();
    print!("{output}");
    commit(workspace)
}

pub fn select_note<S: KeyValueStore>(config: &AppConfig, storage: S, args: IdArgs) -> Result<()> {
    let mut workspace = open_workspace(config, storage)?;
    let output = select_item(&mut workspace, &args.id)?;
    commit(workspace)?;
    print!("{output}");
    Ok(())
}

pub fn edit_note<S: KeyValueStore>(config: &AppConfig, storage: S, args: EditArgs) -> Result<()> {
    let body = match args.body {
        Some(body) => body,
        None => match read_stdin()? {
            Some(body) => body,
            None => bail!("provide --body or pipe the new body on stdin"),
        },
    };
    let mut workspace = open_workspace(config, storage)?;
    let output = edit_item(&mut workspace, &args.id, &body)?;
    commit(workspace)?;
    print!("{output}");
    Ok(())
}

pub fn rename_note<S: KeyValueStore>(
    config: &AppConfig,
    storage: S,
    args: RenameArgs,
) -> Result<()> {
    let mut workspace = open_workspace(config, storage)?;
    let output = rename_item(&mut workspace, &args.id, &args.title.join(" "))?;
    commit(workspace)?;
    print!("{output}");
    Ok(())
}

pub fn delete_note<S: KeyValueStore>(
    config: &AppConfig,
    storage: S,
    args: DeleteArgs,
) -> Result<()> {
    let mut workspace = open_workspace(config, storage)?;
    let id = resolve_id(workspace.snapshot(), &args.id)?;
    if !args.yes && atty::is(atty::Stream::Stdin) {
        let title = workspace
            .snapshot()
            .get(&id)
            .map(Item::display_title)
            .unwrap_or_default();
        let answer = prompt(&format!("Delete \"{title}\"? [y/N]"))?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return commit(workspace);
        }
    }
    let output = delete_item(&mut workspace, &id)?;
    commit(workspace)?;
    print!("{output}");
    Ok(())
}

pub fn export_note<S: KeyValueStore>(config: &AppConfig, storage: S, args: IdArgs) -> Result<()> {
    let workspace = open_workspace(config, storage)?;
    let output = export_item(workspace.snapshot(), &args.id)?;
    print!("{output}");
    commit(workspace)
}

pub fn theme<S: KeyValueStore>(config: &AppConfig, storage: S, args: ThemeArgs) -> Result<()> {
    let output = apply_theme(&storage, config.theme, args.choice)?;
    println!("{output}");
    Ok(())
}

pub fn sidebar<S: KeyValueStore>(storage: S, args: SidebarArgs) -> Result<()> {
    let output = apply_sidebar(&storage, args.choice)?;
    println!("{output}");
    Ok(())
}

fn open_workspace<S: KeyValueStore>(
    config: &AppConfig,
    storage: S,
) -> Result<Workspace<S, SystemEnvironment>> {
    Workspace::open_default(storage, &config.auto_save).context("opening workspace")
}

/// Closes the workspace and turns any failed write into an error.
fn commit<S, E>(workspace: Workspace<S, E>) -> Result<()>
where
    S: KeyValueStore,
    E: Environment,
{
    if let Some(warning) = workspace.save_warning() {
        bail!(warning);
    }
    if let Some(AutoSaveEvent::Error { message }) = workspace.close() {
        bail!("Changes may not be saved: {message}");
    }
    Ok(())
}

fn create_item<S, E>(workspace: &mut Workspace<S, E>, title: Option<&str>, body: &str) -> String
where
    S: KeyValueStore,
    E: Environment,
{
    let item = workspace.create(title);
    if !body.is_empty() {
        workspace.update_body(&item.id, body);
    }
    let title = workspace
        .snapshot()
        .get(&item.id)
        .map(Item::display_title)
        .unwrap_or_default();
    format!("Created {} {}\n", short_id(&item.id), title)
}

fn select_item<S, E>(workspace: &mut Workspace<S, E>, raw_id: &str) -> Result<String>
where
    S: KeyValueStore,
    E: Environment,
{
    let id = resolve_id(workspace.snapshot(), raw_id)?;
    workspace.select(&id);
    Ok(format!("Selected {}\n", describe(workspace.snapshot(), &id)))
}

fn edit_item<S, E>(workspace: &mut Workspace<S, E>, raw_id: &str, body: &str) -> Result<String>
where
    S: KeyValueStore,
    E: Environment,
{
    let id = resolve_id(workspace.snapshot(), raw_id)?;
    workspace.update_body(&id, body);
    let chars = workspace
        .snapshot()
        .get(&id)
        .map(Item::char_count)
        .unwrap_or_default();
    Ok(format!(
        "Updated {} ({chars} characters)\n",
        describe(workspace.snapshot(), &id)
    ))
}

fn rename_item<S, E>(workspace: &mut Workspace<S, E>, raw_id: &str, title: &str) -> Result<String>
where
    S: KeyValueStore,
    E: Environment,
{
    let title = title.trim();
    if title.is_empty() {
        bail!("title cannot be empty");
    }
    let id = resolve_id(workspace.snapshot(), raw_id)?;
    workspace.rename(&id, title);
    Ok(format!("Renamed {}\n", describe(workspace.snapshot(), &id)))
}

fn delete_item<S, E>(workspace: &mut Workspace<S, E>, raw_id: &str) -> Result<String>
where
    S: KeyValueStore,
    E: Environment,
{
    let id = resolve_id(workspace.snapshot(), raw_id)?;
    let label = describe(workspace.snapshot(), &id);
    workspace.delete(&id);
    let mut out = format!("Deleted {label}\n");
    if let Some(active) = workspace.active() {
        let _ = writeln!(
            &mut out,
            "Active note is now {}",
            describe(workspace.snapshot(), &active.id)
        );
    }
    Ok(out)
}

fn export_item(feed: &Feed, raw_id: &str) -> Result<String> {
    let id = resolve_id(feed, raw_id)?;
    let text = feed.get(&id).map(Item::plain_text).unwrap_or_default();
    Ok(format!("{text}\n"))
}

fn apply_theme<S>(storage: &S, default_theme: ThemeName, choice: Option<ThemeChoice>) -> Result<String>
where
    S: KeyValueStore + ?Sized,
{
    let mut prefs = Preferences::load(storage, default_theme)?;
    let theme = match choice {
        None => return Ok(format!("Theme: {}", prefs.theme)),
        Some(ThemeChoice::Toggle) => prefs.theme.toggled(),
        Some(ThemeChoice::Dark) => ThemeName::Dark,
        Some(ThemeChoice::Light) => ThemeName::Light,
    };
    prefs.set_theme(storage, theme)?;
    Ok(format!("Theme set to {theme}"))
}

fn apply_sidebar<S>(storage: &S, choice: Option<SidebarChoice>) -> Result<String>
where
    S: KeyValueStore + ?Sized,
{
    let mut prefs = Preferences::load(storage, ThemeName::default())?;
    let sidebar = match choice {
        None => return Ok(format!("Sidebar: {}", prefs.sidebar)),
        Some(SidebarChoice::Toggle) => prefs.sidebar.toggled(),
        Some(SidebarChoice::Open) => SidebarState::Open,
        Some(SidebarChoice::Closed) => SidebarState::Closed,
    };
    prefs.set_sidebar(storage, sidebar)?;
    Ok(format!("Sidebar set to {sidebar}"))
}

/// Accepts a full id or an unambiguous prefix of one.
fn resolve_id(feed: &Feed, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("note id cannot be empty");
    }
    if feed.contains(raw) {
        return Ok(raw.to_string());
    }
    let matches: Vec<&Item> = feed.items().filter(|item| item.id.starts_with(raw)).collect();
    match matches.as_slice() {
        [] => bail!("note '{raw}' not found"),
        [item] => Ok(item.id.clone()),
        _ => bail!(
            "note id '{raw}' is ambiguous ({} matches); use more characters",
            matches.len()
        ),
    }
}

fn format_list(feed: &Feed, spec: SortSpec) -> String {
    let mut out = String::new();
    for item in feed.sorted(spec) {
        let marker = if feed.active_id() == Some(item.id.as_str()) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            &mut out,
            "{marker} {}  {}",
            short_id(&item.id),
            feed.resolve_title(item)
        );
        let _ = writeln!(
            &mut out,
            "    updated {}  {} chars",
            format_timestamp(item.updated_at),
            item.char_count()
        );
    }
    out
}

fn format_item(item: &Item) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", item.display_title());
    let _ = writeln!(&mut out, "id       {}", item.id);
    let _ = writeln!(&mut out, "created  {}", format_date(item.created_at));
    let _ = writeln!(&mut out, "updated  {}", format_timestamp(item.updated_at));
    let _ = writeln!(
        &mut out,
        "length   {} characters, {} words",
        item.char_count(),
        count_words(&item.body)
    );
    out.push('\n');
    let text = item.plain_text();
    if !text.is_empty() {
        let _ = writeln!(&mut out, "{text}");
    }
    out
}

fn describe(feed: &Feed, id: &str) -> String {
    match feed.get(id) {
        Some(item) => format!("{} ({})", short_id(id), feed.resolve_title(item)),
        None => short_id(id).to_string(),
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{} ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading body from stdin")?;
    Ok(Some(buf))
}

fn format_timestamp(epoch_millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(epoch_millis as i128 * 1_000_000)
        .map(|dt| dt.format(&Rfc3339).unwrap_or_else(|_| epoch_millis.to_string()))
        .unwrap_or_else(|_| epoch_millis.to_string())
}
