use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, FocusPane, OverlayState};
use crate::app::EditorState;
use crate::config::ThemeName;
use crate::journaling::AutoSaveStatus;

/// Lines above the body in the editor pane: title, metadata, blank.
const EDITOR_HEADER_LINES: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub editing: Color,
    pub warning: Color,
    pub error: Color,
}

impl Palette {
    pub fn for_theme(theme: ThemeName) -> Self {
        match theme {
            ThemeName::Light => Self {
                background: Color::White,
                text: Color::Black,
                muted: Color::DarkGray,
                accent: Color::Blue,
                selection_bg: Color::LightBlue,
                selection_fg: Color::Black,
                editing: Color::Magenta,
                warning: Color::Yellow,
                error: Color::Red,
            },
            ThemeName::Dark => Self {
                background: Color::Black,
                text: Color::White,
                muted: Color::Gray,
                accent: Color::Cyan,
                selection_bg: Color::Blue,
                selection_fg: Color::Black,
                editing: Color::Magenta,
                warning: Color::Yellow,
                error: Color::LightRed,
            },
        }
    }

    fn base(&self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }
}

pub fn draw_app(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let palette = Palette::for_theme(state.theme);
    frame.render_widget(Block::default().style(palette.base()), frame.size());

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    let editor_area = if state.sidebar.is_open() {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(vertical[0]);
        draw_sidebar(frame, state, list_state, columns[0], &palette);
        columns[1]
    } else {
        vertical[0]
    };

    draw_editor(frame, state, editor_area, &palette);

    let status = Paragraph::new(build_status_line(state, &palette)).style(palette.base());
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state, &palette);
}

fn border_style(focused: bool, palette: &Palette) -> Style {
    if focused {
        Style::default().fg(palette.accent)
    } else {
        Style::default().fg(palette.muted)
    }
}

fn draw_sidebar(
    frame: &mut Frame,
    state: &AppState,
    list_state: &mut ListState,
    area: Rect,
    palette: &Palette,
) {
    let editing_id = state.editor().map(EditorState::item_id);
    let items: Vec<ListItem> = state
        .items
        .iter()
        .map(|entry| {
            let mut title_spans = Vec::new();
            if editing_id == Some(entry.id.as_str()) {
                let label = if state.editor_dirty() { "✎* " } else { "✎ " };
                title_spans.push(Span::styled(
                    label,
                    Style::default()
                        .fg(palette.editing)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            title_spans.push(Span::styled(
                entry.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            ListItem::new(vec![
                Line::from(title_spans),
                Line::from(Span::styled(
                    format!("Updated {}", entry.updated),
                    Style::default().fg(palette.muted),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Notes ({})", state.len()))
                .borders(Borders::ALL)
                .border_style(border_style(state.focus == FocusPane::List, palette)),
        )
        .style(palette.base())
        .highlight_style(
            Style::default()
                .bg(palette.selection_bg)
                .fg(palette.selection_fg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn draw_editor(frame: &mut Frame, state: &AppState, area: Rect, palette: &Palette) {
    let editor = state.editor();
    let text: Text = state
        .selected()
        .map(|entry| {
            let editing = editor.is_some_and(|editor| editor.item_id() == entry.id);
            let mut header = Vec::new();
            if editing {
                let label = if state.editor_dirty() { "[EDIT*] " } else { "[EDIT] " };
                header.push(Span::styled(
                    label,
                    Style::default()
                        .fg(palette.editing)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            header.push(Span::styled(
                entry.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            let mut lines = vec![
                Line::from(header),
                Line::from(Span::styled(
                    format!(
                        "Created {} • {} characters • {} words",
                        entry.created, entry.char_count, entry.word_count
                    ),
                    Style::default().fg(palette.muted),
                )),
                Line::from(""),
            ];
            let body = match editor {
                Some(editor) if editing => editor.buffer(),
                _ => entry.plain_text.as_str(),
            };
            if body.is_empty() && !editing {
                lines.push(Line::from(Span::styled(
                    "Empty note. Press e to start writing.",
                    Style::default()
                        .fg(palette.muted)
                        .add_modifier(Modifier::ITALIC),
                )));
            } else {
                lines.extend(body.split('\n').map(|line| Line::from(line.to_string())));
            }
            Text::from(lines)
        })
        .unwrap_or_else(|| Text::from("No note selected."));

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title("Editor")
                .borders(Borders::ALL)
                .border_style(border_style(state.focus == FocusPane::Editor, palette)),
        )
        .style(palette.base())
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);

    if let Some(editor) = editor {
        if state.selected_id() == Some(editor.item_id()) && state.overlay().is_none() {
            if let Some((x, y)) = editor_cursor_screen_position(editor, area) {
                frame.set_cursor(x, y);
            }
        }
    }
}

fn build_status_line(state: &AppState, palette: &Palette) -> Text<'static> {
    let position = if state.is_empty() {
        "0/0".to_string()
    } else {
        format!("{}/{}", state.selected + 1, state.len())
    };
    let mut spans = vec![
        Span::raw("Note "),
        Span::styled(position, Style::default().add_modifier(Modifier::BOLD)),
    ];
    if let Some(entry) = state.selected() {
        spans.push(Span::raw(format!(" | {} chars", entry.char_count)));
        spans.push(Span::raw(format!(" | Created {}", entry.created)));
    }
    spans.push(Span::raw(" | "));
    spans.extend(autosave_spans(state.autosave_status(), palette));

    if let Some(warning) = &state.save_warning {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            warning.clone(),
            Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        ));
    } else if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(palette.accent),
        ));
    }

    let keys = if state.is_editing() {
        "Esc done • Ctrl-s save • Ctrl-z undo • Ctrl-y redo • Ctrl-←/→ word jump"
    } else {
        "j/k move • e edit • a new • r rename • d delete • y export • s sidebar • t theme • q quit"
    };
    Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(keys, Style::default().fg(palette.muted))),
    ])
}

fn autosave_spans(status: &AutoSaveStatus, palette: &Palette) -> Vec<Span<'static>> {
    match status {
        AutoSaveStatus::Disabled => vec![Span::raw("Autosave off")],
        AutoSaveStatus::Idle {
            last_saved_at: None,
        } => vec![Span::raw("Saved")],
        AutoSaveStatus::Idle {
            last_saved_at: Some(ts),
        } => vec![
            Span::raw("Saved "),
            Span::styled(format_time_short(*ts), Style::default().fg(palette.muted)),
        ],
        AutoSaveStatus::Pending { .. } => vec![Span::styled(
            "Saving…",
            Style::default()
                .fg(palette.warning)
                .add_modifier(Modifier::BOLD),
        )],
        AutoSaveStatus::Error { .. } => vec![Span::styled(
            "Not saved",
            Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        )],
    }
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Screen cell for the editor cursor, assuming the body wraps at the pane edge.
fn editor_cursor_screen_position(editor: &EditorState, area: Rect) -> Option<(u16, u16)> {
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    if inner_width == 0 || inner_height == 0 {
        return None;
    }

    let width_limit = inner_width as usize;
    let mut row = EDITOR_HEADER_LINES;
    let mut col = 0usize;
    let buffer = editor.buffer();
    let cursor = editor.cursor().min(buffer.len());

    for grapheme in buffer[..cursor].graphemes(true) {
        if grapheme == "\n" {
            row = row.saturating_add(1);
            col = 0;
            continue;
        }
        let glyph_width = UnicodeWidthStr::width(grapheme);
        if glyph_width > 0 && col + glyph_width > width_limit {
            row = row.saturating_add(1);
            col = 0;
        }
        col += glyph_width;
    }

    let row = row.min(inner_height - 1);
    let col = col.min(width_limit - 1) as u16;
    Some((area.x + 1 + col, area.y + 1 + row))
}

fn render_overlay(frame: &mut Frame, state: &AppState, palette: &Palette) {
    let Some(overlay) = state.overlay() else {
        return;
    };
    let (title, lines, accent) = match overlay {
        OverlayState::NewNote(draft) => (
            "New Note".to_string(),
            input_lines("Title (leave empty to derive it from the text)", &draft.title, palette),
            palette.accent,
        ),
        OverlayState::RenameNote(draft) => (
            "Rename Note".to_string(),
            input_lines("New title", &draft.title, palette),
            palette.accent,
        ),
        OverlayState::DeleteNote(draft) => (
            "Confirm Delete".to_string(),
            vec![
                Line::from(Span::styled(
                    format!("Delete \"{}\"?", draft.title),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    "This cannot be undone.",
                    Style::default().fg(palette.error),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter or y delete • Esc cancel",
                    Style::default().fg(palette.muted),
                )),
            ],
            palette.error,
        ),
        OverlayState::Export(export) => {
            let mut lines: Vec<Line> = export
                .text
                .split('\n')
                .map(|line| Line::from(line.to_string()))
                .collect();
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Select the text to copy • Esc close",
                Style::default().fg(palette.muted),
            )));
            (format!("Plain text: {}", export.title), lines, palette.accent)
        }
    };

    let area = match overlay {
        OverlayState::Export(_) => centered_rect(80, 80, frame.size()),
        _ => centered_rect(60, 30, frame.size()),
    };
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent)),
        )
        .style(palette.base())
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn input_lines(label: &str, value: &str, palette: &Palette) -> Vec<Line<'static>> {
    vec![
        Line::from(Span::styled(
            label.to_string(),
            Style::default().fg(palette.muted),
        )),
        Line::from(""),
        Line::from(format!("{value}▌")),
        Line::from(""),
        Line::from(Span::styled(
            "Enter to save • Esc to cancel",
            Style::default().fg(palette.muted),
        )),
    ]
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
