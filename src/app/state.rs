use super::editor::EditorState;
use crate::config::{SortSpec, ThemeName};
use crate::feed::text::{count_words, format_date};
use crate::feed::{Feed, Item};
use crate::journaling::AutoSaveStatus;
use crate::preferences::{Preferences, SidebarState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    List,
    Editor,
}

/// One sidebar row, derived from an [`Item`] each time the feed changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub id: String,
    pub title: String,
    pub body: String,
    pub plain_text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub created: String,
    pub updated: String,
}

impl ItemSummary {
    fn from_item(feed: &Feed, item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: feed.resolve_title(item),
            body: item.body.clone(),
            plain_text: item.plain_text(),
            char_count: item.char_count(),
            word_count: count_words(&item.body),
            created: format_date(item.created_at),
            updated: format_date(item.updated_at),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewNoteOverlay {
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RenameNoteOverlay {
    pub item_id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct DeleteNoteOverlay {
    pub item_id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct ExportOverlay {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    NewNote(NewNoteOverlay),
    RenameNote(RenameNoteOverlay),
    DeleteNote(DeleteNoteOverlay),
    Export(ExportOverlay),
}

/// Everything the renderer needs, rebuilt from the workspace after each change.
#[derive(Debug, Clone)]
pub struct AppState {
    pub focus: FocusPane,
    pub selected: usize,
    pub sort: SortSpec,
    pub items: Vec<ItemSummary>,
    pub status_message: Option<String>,
    pub save_warning: Option<String>,
    pub overlay: Option<OverlayState>,
    pub editor: Option<EditorState>,
    pub autosave_status: AutoSaveStatus,
    pub theme: ThemeName,
    pub sidebar: SidebarState,
}

impl AppState {
    pub fn new(sort: SortSpec, preferences: Preferences) -> Self {
        Self {
            focus: FocusPane::List,
            selected: 0,
            sort,
            items: Vec::new(),
            status_message: None,
            save_warning: None,
            overlay: None,
            editor: None,
            autosave_status: AutoSaveStatus::Idle {
                last_saved_at: None,
            },
            theme: preferences.theme,
            sidebar: preferences.sidebar,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rebuilds the sidebar rows and moves the selection onto the active item.
    pub fn sync(&mut self, feed: &Feed) {
        self.items = feed
            .sorted(self.sort)
            .into_iter()
            .map(|item| ItemSummary::from_item(feed, item))
            .collect();
        match feed
            .active_id()
            .and_then(|id| self.items.iter().position(|entry| entry.id == id))
        {
            Some(idx) => self.selected = idx,
            None => self.normalize_selection(),
        }
        if let Some(editor) = &self.editor {
            if !feed.contains(editor.item_id()) {
                self.editor = None;
            }
        }
    }

    pub fn selected(&self) -> Option<&ItemSummary> {
        self.items.get(self.selected)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected().map(|entry| entry.id.as_str())
    }

    /// Id of the row `delta` steps away from the selection, clamped to the list.
    pub fn neighbour_id(&self, delta: isize) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() as isize - 1;
        let target = (self.selected as isize + delta).clamp(0, last) as usize;
        if target == self.selected {
            return None;
        }
        self.items.get(target).map(|entry| entry.id.as_str())
    }

    pub fn editor(&self) -> Option<&EditorState> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut EditorState> {
        self.editor.as_mut()
    }

    pub fn is_editing(&self) -> bool {
        self.editor.is_some()
    }

    pub fn begin_editor(&mut self, item_id: String, body: String) {
        self.editor = Some(EditorState::new(item_id, body));
        self.focus = FocusPane::Editor;
    }

    pub fn close_editor(&mut self) {
        self.editor = None;
        self.focus = FocusPane::List;
    }

    pub fn editor_dirty(&self) -> bool {
        self.editor.as_ref().is_some_and(EditorState::is_dirty)
    }

    pub fn mark_editor_saved(&mut self) {
        if let Some(editor) = self.editor.as_mut() {
            editor.mark_saved();
        }
    }

    pub fn autosave_status(&self) -> &AutoSaveStatus {
        &self.autosave_status
    }

    pub fn set_save_state(&mut self, status: AutoSaveStatus, warning: Option<String>) {
        self.autosave_status = status;
        self.save_warning = warning;
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::List => FocusPane::Editor,
            FocusPane::Editor => FocusPane::List,
        };
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut OverlayState> {
        self.overlay.as_mut()
    }

    pub fn open_new_note(&mut self) {
        self.overlay = Some(OverlayState::NewNote(NewNoteOverlay::default()));
    }

    pub fn open_rename_note(&mut self) {
        if let Some(entry) = self.selected() {
            self.overlay = Some(OverlayState::RenameNote(RenameNoteOverlay {
                item_id: entry.id.clone(),
                title: entry.title.clone(),
            }));
        }
    }

    pub fn open_delete_note(&mut self) {
        if let Some(entry) = self.selected() {
            self.overlay = Some(OverlayState::DeleteNote(DeleteNoteOverlay {
                item_id: entry.id.clone(),
                title: entry.title.clone(),
            }));
        }
    }

    pub fn open_export(&mut self) {
        if let Some(entry) = self.selected() {
            self.overlay = Some(OverlayState::Export(ExportOverlay {
                title: entry.title.clone(),
                text: entry.plain_text.clone(),
            }));
        }
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    /// Title being typed in the new-note or rename overlay.
    pub fn overlay_input_mut(&mut self) -> Option<&mut String> {
        match self.overlay_mut() {
            Some(OverlayState::NewNote(draft)) => Some(&mut draft.title),
            Some(OverlayState::RenameNote(draft)) => Some(&mut draft.title),
            _ => None,
        }
    }

    fn normalize_selection(&mut self) {
        if self.items.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.items.len() {
            self.selected = self.items.len() - 1;
        }
    }
}
