//! Rendered view snapshots

use std::fmt;

use terminal::{Cursor, Grid};

/// Read-only view onto a session's grid
///
/// Every [`Viewer::render`] takes a fresh snapshot; nothing is cached.
#[derive(Debug, Clone, Copy)]
pub struct Viewer<'a> {
    grid: &'a Grid,
    strip_ansi: bool,
    trim: bool,
}

impl<'a> Viewer<'a> {
    /// Raw rendering: no stripping, no trimming
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            strip_ansi: false,
            trim: false,
        }
    }

    /// Remove any escape sequences left in the rendered text
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Trim leading and trailing whitespace from the whole snapshot
    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    pub fn render(&self) -> String {
        let mut text = self.grid.render();
        if self.strip_ansi {
            text = strip_ansi_escapes::strip_str(&text);
        }
        if self.trim {
            text = text.trim().to_string();
        }
        text
    }

    pub fn cursor(&self) -> Cursor {
        self.grid.cursor()
    }

    /// Grid size as (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        self.grid.size()
    }
}

impl fmt::Display for Viewer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
