use std::mem;
use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

const UNDO_DEPTH: usize = 200;

/// Cursor movements understood by [`EditorState::move_cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    WordLeft,
    WordRight,
    LineStart,
    LineEnd,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    text: String,
    cursor: usize,
}

/// In-progress body edit for one item.
///
/// `cursor` is a byte offset that always sits on a grapheme boundary. Vertical
/// motion remembers the column it started from so that passing through a short
/// line does not lose the horizontal position.
#[derive(Debug, Clone)]
pub struct EditorState {
    item_id: String,
    text: String,
    cursor: usize,
    dirty: bool,
    goal_column: Option<usize>,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
}

impl EditorState {
    pub fn new(item_id: String, text: String) -> Self {
        let cursor = text.len();
        Self {
            item_id,
            text,
            cursor,
            dirty: false,
            goal_column: None,
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn buffer(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the unsaved marker. Undo history survives a save.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        self.checkpoint();
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
        self.goal_column = None;
        self.dirty = true;
        true
    }

    pub fn backspace(&mut self) -> bool {
        let start = self.prev_boundary(self.cursor);
        self.remove(start..self.cursor)
    }

    pub fn delete(&mut self) -> bool {
        let end = self.next_boundary(self.cursor);
        self.remove(self.cursor..end)
    }

    /// Returns `false` when the cursor could not move.
    pub fn move_cursor(&mut self, motion: Motion) -> bool {
        let (target, goal) = match motion {
            Motion::Left => (self.prev_boundary(self.cursor), None),
            Motion::Right => (self.next_boundary(self.cursor), None),
            Motion::WordLeft => (self.word_start_before(), None),
            Motion::WordRight => (self.word_start_after(), None),
            Motion::LineStart => (self.line_bounds(self.cursor).start, None),
            Motion::LineEnd => (self.line_bounds(self.cursor).end, None),
            Motion::Up | Motion::Down => {
                let column = self.goal_column.unwrap_or_else(|| self.column());
                (self.vertical_target(motion == Motion::Up, column), Some(column))
            }
        };
        self.goal_column = goal;
        if target == self.cursor {
            return false;
        }
        self.cursor = target;
        true
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.undo.pop() else {
            return false;
        };
        let current = self.restore(previous);
        self.redo.push(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        let current = self.restore(next);
        self.undo.push(current);
        true
    }

    fn remove(&mut self, range: Range<usize>) -> bool {
        if range.is_empty() {
            return false;
        }
        self.checkpoint();
        self.cursor = range.start;
        self.text.replace_range(range, "");
        self.goal_column = None;
        self.dirty = true;
        true
    }

    fn checkpoint(&mut self) {
        self.redo.clear();
        self.undo.push(Snapshot {
            text: self.text.clone(),
            cursor: self.cursor,
        });
        if self.undo.len() > UNDO_DEPTH {
            self.undo.remove(0);
        }
    }

    fn restore(&mut self, snapshot: Snapshot) -> Snapshot {
        let current = Snapshot {
            text: mem::replace(&mut self.text, snapshot.text),
            cursor: self.cursor,
        };
        self.cursor = snapshot.cursor;
        self.goal_column = None;
        self.dirty = true;
        current
    }

    fn prev_boundary(&self, at: usize) -> usize {
        self.text[..at]
            .grapheme_indices(true)
            .next_back()
            .map_or(0, |(offset, _)| offset)
    }

    fn next_boundary(&self, at: usize) -> usize {
        self.text[at..]
            .graphemes(true)
            .next()
            .map_or(at, |grapheme| at + grapheme.len())
    }

    fn line_bounds(&self, at: usize) -> Range<usize> {
        let start = self.text[..at].rfind('\n').map_or(0, |idx| idx + 1);
        let end = self.text[at..]
            .find('\n')
            .map_or(self.text.len(), |idx| at + idx);
        start..end
    }

    fn column(&self) -> usize {
        let line = self.line_bounds(self.cursor);
        self.text[line.start..self.cursor].graphemes(true).count()
    }

    fn offset_at_column(&self, line_start: usize, column: usize) -> usize {
        let line = self.line_bounds(line_start);
        self.text[line.clone()]
            .grapheme_indices(true)
            .nth(column)
            .map_or(line.end, |(offset, _)| line.start + offset)
    }

    fn vertical_target(&self, up: bool, column: usize) -> usize {
        let line = self.line_bounds(self.cursor);
        if up {
            if line.start == 0 {
                return 0;
            }
            let previous = self.line_bounds(line.start - 1);
            self.offset_at_column(previous.start, column)
        } else {
            if line.end == self.text.len() {
                return line.end;
            }
            self.offset_at_column(line.end + 1, column)
        }
    }

    fn word_start_before(&self) -> usize {
        let mut target = self.cursor;
        let mut seen_word = false;
        for (offset, grapheme) in self.text[..self.cursor].grapheme_indices(true).rev() {
            let blank = is_blank(grapheme);
            if seen_word && blank {
                break;
            }
            seen_word |= !blank;
            target = offset;
        }
        target
    }

    fn word_start_after(&self) -> usize {
        let mut in_gap = false;
        for (offset, grapheme) in self.text[self.cursor..].grapheme_indices(true) {
            let blank = is_blank(grapheme);
            if in_gap && !blank {
                return self.cursor + offset;
            }
            in_gap |= blank;
        }
        self.text.len()
    }
}

fn is_blank(grapheme: &str) -> bool {
    grapheme.chars().all(char::is_whitespace)
}
