use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::journaling::AutoSaveEvent;
use crate::preferences::Preferences;
use crate::storage::KeyValueStore;
use crate::ui;
use crate::workspace::Workspace;

pub mod editor;
pub mod state;

pub use editor::{EditorState, Motion};
pub use state::{AppState, FocusPane, ItemSummary, OverlayState};

const TITLE_INPUT_LIMIT: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    ToggleFocus,
    NewNote,
    RenameNote,
    DeleteNote,
    EnterEdit,
    ToggleSidebar,
    ToggleTheme,
    Export,
    ManualSave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayKind {
    NewTitle,
    Rename,
    ConfirmDelete,
    Export,
}

pub struct App<S: KeyValueStore> {
    pub config: Arc<AppConfig>,
    workspace: Workspace<S>,
    preferences: Preferences,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl<S: KeyValueStore> App<S> {
    pub fn new(config: Arc<AppConfig>, storage: S) -> Result<Self> {
        let preferences =
            Preferences::load(&storage, config.theme).context("loading preferences")?;
        let workspace = Workspace::open_default(storage, &config.auto_save)
            .context("opening workspace for the editor")?;
        let mut state = AppState::new(config.default_sort, preferences);
        state.sync(workspace.snapshot());
        state.set_save_state(workspace.save_status(), workspace.save_warning());
        Ok(Self {
            config,
            workspace,
            preferences,
            state,
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result?;
        if let Some(AutoSaveEvent::Error { message }) = self.workspace.end_session() {
            bail!("Changes may not be saved: {message}");
        }
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    if self.state.is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.state.selected));
                    }
                    ui::draw_app(frame, &self.state, &mut self.list_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.handle_overlay_key(key) {
            return;
        }
        if self.state.is_editing() && self.handle_editor_key(key) {
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::ManualSave)
            }
            _ if !plain => None,
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Tab => Some(Action::ToggleFocus),
            KeyCode::Char('a') => Some(Action::NewNote),
            KeyCode::Char('r') => Some(Action::RenameNote),
            KeyCode::Char('d') => Some(Action::DeleteNote),
            KeyCode::Char('e') | KeyCode::Enter => Some(Action::EnterEdit),
            KeyCode::Char('s') => Some(Action::ToggleSidebar),
            KeyCode::Char('t') => Some(Action::ToggleTheme),
            KeyCode::Char('y') => Some(Action::Export),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        if self.state.is_editing() && !matches!(action, Action::ManualSave | Action::Quit) {
            self.state.set_status_message(Some(
                "Finish editing (Esc to exit, Ctrl-s to save) before performing other actions.",
            ));
            return;
        }
        match action {
            Action::Quit => {
                if self.state.is_editing() && !self.exit_editing() {
                    return;
                }
                self.should_quit = true;
            }
            Action::SelectNext => self.move_selection(1),
            Action::SelectPrevious => self.move_selection(-1),
            Action::ToggleFocus => self.state.toggle_focus(),
            Action::NewNote => {
                self.state.open_new_note();
                self.state
                    .set_status_message(Some("Type an optional title and press Enter"));
            }
            Action::RenameNote => self.state.open_rename_note(),
            Action::DeleteNote => self.state.open_delete_note(),
            Action::EnterEdit => self.handle_enter_edit(),
            Action::ToggleSidebar => self.handle_toggle_sidebar(),
            Action::ToggleTheme => self.handle_toggle_theme(),
            Action::Export => self.state.open_export(),
            Action::ManualSave => self.handle_manual_save(),
        }
    }

    fn on_tick(&mut self) {
        if let Some(event) = self.workspace.tick() {
            self.handle_autosave_event(event);
        }
        self.refresh_save_state();
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        let kind = match self.state.overlay() {
            None => return false,
            Some(OverlayState::NewNote(_)) => OverlayKind::NewTitle,
            Some(OverlayState::RenameNote(_)) => OverlayKind::Rename,
            Some(OverlayState::DeleteNote(_)) => OverlayKind::ConfirmDelete,
            Some(OverlayState::Export(_)) => OverlayKind::Export,
        };
        match kind {
            OverlayKind::NewTitle | OverlayKind::Rename => match key.code {
                KeyCode::Esc => {
                    self.state.close_overlay();
                    self.state.set_status_message(Some("Canceled"));
                }
                KeyCode::Enter if kind == OverlayKind::NewTitle => self.submit_new_note(),
                KeyCode::Enter => self.submit_rename_note(),
                KeyCode::Backspace => {
                    if let Some(input) = self.state.overlay_input_mut() {
                        input.pop();
                    }
                }
                KeyCode::Char(ch)
                    if !key.modifiers.intersects(
                        KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                    ) =>
                {
                    if let Some(input) = self.state.overlay_input_mut() {
                        if input.chars().count() < TITLE_INPUT_LIMIT {
                            input.push(ch);
                        }
                    }
                }
                _ => {}
            },
            OverlayKind::ConfirmDelete => match key.code {
                KeyCode::Esc | KeyCode::Char('n') => {
                    self.state.close_overlay();
                    self.state.set_status_message(Some("Delete canceled"));
                }
                KeyCode::Enter | KeyCode::Char('y') => self.submit_delete_note(),
                _ => {}
            },
            OverlayKind::Export => {
                if matches!(
                    key.code,
                    KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('y')
                ) {
                    self.state.close_overlay();
                }
            }
        }
        true
    }

    fn submit_new_note(&mut self) {
        let Some(OverlayState::NewNote(draft)) = self.state.overlay() else {
            return;
        };
        let title = draft.title.trim().to_string();
        let hint = (!title.is_empty()).then_some(title.as_str());
        let item = self.workspace.create(hint);
        self.state.close_overlay();
        self.sync();
        self.state.begin_editor(item.id, item.body);
        self.report_mutation("Note created; type to write, Esc when done");
    }

    fn submit_rename_note(&mut self) {
        let Some(OverlayState::RenameNote(draft)) = self.state.overlay() else {
            return;
        };
        let (item_id, title) = (draft.item_id.clone(), draft.title.trim().to_string());
        if title.is_empty() {
            self.state.set_status_message(Some("Title cannot be empty"));
            return;
        }
        self.workspace.rename(&item_id, &title);
        self.state.close_overlay();
        self.sync();
        self.report_mutation("Note renamed");
    }

    fn submit_delete_note(&mut self) {
        let Some(OverlayState::DeleteNote(draft)) = self.state.overlay() else {
            return;
        };
        let item_id = draft.item_id.clone();
        self.workspace.delete(&item_id);
        self.state.close_overlay();
        self.sync();
        self.report_mutation("Note deleted");
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(id) = self.state.neighbour_id(delta).map(str::to_string) else {
            return;
        };
        self.workspace.select(&id);
        self.sync();
        self.refresh_save_state();
    }

    fn handle_enter_edit(&mut self) {
        let Some(item) = self.workspace.active().cloned() else {
            self.state.set_status_message(Some("Nothing to edit"));
            return;
        };
        self.state.begin_editor(item.id, item.body);
        self.state
            .set_status_message(Some("Editing: Esc exit • Ctrl-s save • Ctrl-z undo"));
    }

    fn handle_toggle_sidebar(&mut self) {
        match self.preferences.toggle_sidebar(self.workspace.storage()) {
            Ok(sidebar) => {
                self.state.sidebar = sidebar;
                self.state.set_status_message(None::<String>);
            }
            Err(err) => {
                tracing::warn!(?err, "failed to save sidebar preference");
                self.state
                    .set_status_message(Some("Could not save sidebar preference"));
            }
        }
    }

    fn handle_toggle_theme(&mut self) {
        match self.preferences.toggle_theme(self.workspace.storage()) {
            Ok(theme) => {
                self.state.theme = theme;
                self.state
                    .set_status_message(Some(format!("Theme: {theme}")));
            }
            Err(err) => {
                tracing::warn!(?err, "failed to save theme preference");
                self.state
                    .set_status_message(Some("Could not save theme preference"));
            }
        }
    }

    fn handle_manual_save(&mut self) {
        match self.workspace.flush() {
            Some(event) => self.handle_autosave_event(event),
            None => self.state.set_status_message(Some("No pending changes")),
        }
        self.refresh_save_state();
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('z') => {
                    let message = if self.apply_editor_change(EditorState::undo) {
                        "Undid change"
                    } else {
                        "Nothing to undo"
                    };
                    self.state.set_status_message(Some(message));
                    return true;
                }
                KeyCode::Char('y') => {
                    let message = if self.apply_editor_change(EditorState::redo) {
                        "Redid change"
                    } else {
                        "Nothing to redo"
                    };
                    self.state.set_status_message(Some(message));
                    return true;
                }
                KeyCode::Left => return self.move_cursor(Motion::WordLeft),
                KeyCode::Right => return self.move_cursor(Motion::WordRight),
                _ => return false,
            }
        }

        match key.code {
            KeyCode::Esc => {
                if self.exit_editing() {
                    self.state.set_status_message(Some("Exited edit mode"));
                }
                true
            }
            KeyCode::Enter => {
                self.apply_editor_change(|editor| editor.insert_char('\n'));
                true
            }
            KeyCode::Backspace => {
                self.apply_editor_change(EditorState::backspace);
                true
            }
            KeyCode::Delete => {
                self.apply_editor_change(EditorState::delete);
                true
            }
            KeyCode::Tab => {
                self.apply_editor_change(|editor| editor.insert_char('\t'));
                true
            }
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                self.apply_editor_change(|editor| editor.insert_char(ch));
                true
            }
            KeyCode::Left => self.move_cursor(Motion::Left),
            KeyCode::Right => self.move_cursor(Motion::Right),
            KeyCode::Up => self.move_cursor(Motion::Up),
            KeyCode::Down => self.move_cursor(Motion::Down),
            KeyCode::Home => self.move_cursor(Motion::LineStart),
            KeyCode::End => self.move_cursor(Motion::LineEnd),
            _ => false,
        }
    }

    fn move_cursor(&mut self, motion: Motion) -> bool {
        if let Some(editor) = self.state.editor_mut() {
            editor.move_cursor(motion);
        }
        true
    }

    fn apply_editor_change<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut EditorState) -> bool,
    {
        let Some(editor) = self.state.editor_mut() else {
            return false;
        };
        if !f(editor) {
            return false;
        }
        let (id, body) = (editor.item_id().to_string(), editor.buffer().to_string());
        self.workspace.update_body(&id, &body);
        self.sync();
        self.refresh_save_state();
        true
    }

    /// Flushes the pending edit; stays in edit mode when the write fails.
    fn exit_editing(&mut self) -> bool {
        if !self.state.is_editing() {
            return true;
        }
        if let Some(event) = self.workspace.flush() {
            let failed = matches!(event, AutoSaveEvent::Error { .. });
            self.handle_autosave_event(event);
            if failed {
                self.state.set_status_message(Some(
                    "Failed to save changes; still in edit mode (Ctrl-s to retry)",
                ));
                return false;
            }
        }
        self.state.close_editor();
        self.refresh_save_state();
        true
    }

    fn handle_autosave_event(&mut self, event: AutoSaveEvent) {
        match event {
            AutoSaveEvent::Saved { .. } => self.state.mark_editor_saved(),
            AutoSaveEvent::Error { message } => {
                tracing::warn!(%message, "autosave error");
                self.state
                    .set_status_message(Some(format!("Changes may not be saved: {message}")));
            }
        }
    }

    fn report_mutation(&mut self, success: &str) {
        self.refresh_save_state();
        match self.workspace.save_warning() {
            Some(warning) => self.state.set_status_message(Some(warning)),
            None => self.state.set_status_message(Some(success)),
        }
    }

    fn sync(&mut self) {
        self.state.sync(self.workspace.snapshot());
    }

    fn refresh_save_state(&mut self) {
        self.state
            .set_save_state(self.workspace.save_status(), self.workspace.save_warning());
        if !self.workspace.has_unsaved_changes() {
            self.state.mark_editor_saved();
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeName;
    use crate::preferences::SidebarState;
    use crate::storage::{MemoryStorage, FEED_KEY, THEME_KEY};
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_text(app: &mut App<&MemoryStorage>, text: &str) {
        for ch in text.chars() {
            app.handle_key(press(KeyCode::Char(ch)));
        }
    }

    fn app(storage: &MemoryStorage) -> Result<App<&MemoryStorage>> {
        App::new(Arc::new(AppConfig::default()), storage)
    }

    #[test]
    fn new_note_flow_creates_and_edits() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        assert_eq!(app.state().len(), 1);

        app.handle_key(press(KeyCode::Char('a')));
        type_text(&mut app, "Ideas");
        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.state().len(), 2);
        assert!(app.state().is_editing());

        type_text(&mut app, "first thought");
        assert!(app.workspace.has_unsaved_changes());
        app.handle_key(press(KeyCode::Esc));
        assert!(!app.state().is_editing());
        assert!(!app.workspace.has_unsaved_changes());

        let stored = storage.get(FEED_KEY)?.unwrap_or_default();
        assert!(stored.contains("first thought"));
        assert_eq!(app.state().selected().map(|entry| entry.title.as_str()), Some("Ideas"));
        Ok(())
    }

    #[test]
    fn actions_are_blocked_while_editing() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        app.handle_key(press(KeyCode::Char('e')));
        assert!(app.state().is_editing());
        app.handle_key(press(KeyCode::Char('d')));
        assert!(app.state().overlay().is_none());
        assert_eq!(
            app.state().editor().map(EditorState::buffer),
            Some("d")
        );
        Ok(())
    }

    #[test]
    fn delete_confirmation_replaces_last_note() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        let original = app.state().selected_id().map(str::to_string);

        app.handle_key(press(KeyCode::Char('d')));
        assert!(matches!(app.state().overlay(), Some(OverlayState::DeleteNote(_))));
        app.handle_key(press(KeyCode::Char('y')));

        assert_eq!(app.state().len(), 1);
        assert_ne!(app.state().selected_id().map(str::to_string), original);
        Ok(())
    }

    #[test]
    fn selection_moves_the_active_pointer() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        app.handle_key(press(KeyCode::Char('a')));
        app.handle_key(press(KeyCode::Enter));
        app.handle_key(press(KeyCode::Esc));
        let top = app.state().selected_id().map(str::to_string);

        app.handle_key(press(KeyCode::Char('j')));
        let below = app.state().selected_id().map(str::to_string);
        assert_ne!(top, below);
        assert_eq!(
            app.workspace.snapshot().active_id().map(str::to_string),
            below
        );
        Ok(())
    }

    #[test]
    fn theme_and_sidebar_toggles_persist() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        app.handle_key(press(KeyCode::Char('t')));
        app.handle_key(press(KeyCode::Char('s')));
        assert_eq!(app.state().theme, ThemeName::Dark);
        assert_eq!(app.state().sidebar, SidebarState::Closed);
        assert_eq!(storage.get(THEME_KEY)?.as_deref(), Some("dark"));
        Ok(())
    }

    #[test]
    fn rename_overlay_rejects_blank_title() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        app.handle_key(press(KeyCode::Char('r')));
        for _ in 0.."Untitled".len() {
            app.handle_key(press(KeyCode::Backspace));
        }
        app.handle_key(press(KeyCode::Enter));
        assert!(matches!(app.state().overlay(), Some(OverlayState::RenameNote(_))));
        assert_eq!(app.state().status_message.as_deref(), Some("Title cannot be empty"));

        type_text(&mut app, "Journal");
        app.handle_key(press(KeyCode::Enter));
        assert!(app.state().overlay().is_none());
        assert_eq!(app.state().selected().map(|entry| entry.title.as_str()), Some("Journal"));
        Ok(())
    }

    #[test]
    fn failed_writes_surface_in_status() -> Result<()> {
        let storage = MemoryStorage::new();
        let mut app = app(&storage)?;
        storage.set_reject_writes(true);
        app.handle_key(press(KeyCode::Char('a')));
        app.handle_key(press(KeyCode::Enter));
        let warning = app.state().save_warning.clone().unwrap_or_default();
        assert!(warning.starts_with("Changes may not be saved"));
        assert_eq!(app.state().len(), 2);
        Ok(())
    }
}
