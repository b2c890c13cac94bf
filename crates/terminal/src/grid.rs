//! Terminal grid
//!
//! Wraps alacritty_terminal with a VTE parser behind a shared lock so the
//! session's pump can write while tests sample the cursor and the text.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::sync::FairMutex;
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::Config as TermConfig;
use alacritty_terminal::term::Term;
use alacritty_terminal::vte::ansi;

/// Event listener that forwards terminal query responses
pub struct GridEventProxy {
    sender: Sender<Vec<u8>>,
}

impl EventListener for GridEventProxy {
    fn send_event(&self, event: Event) {
        if let Event::PtyWrite(text) = event {
            let _ = self.sender.send(text.into_bytes());
        }
    }
}

/// Simple size struct implementing Dimensions
struct Size {
    cols: usize,
    rows: usize,
}

impl Dimensions for Size {
    fn total_lines(&self) -> usize {
        self.rows
    }

    fn screen_lines(&self) -> usize {
        self.rows
    }

    fn columns(&self) -> usize {
        self.cols
    }
}

/// Cursor position on the visible screen, zero-based
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub row: usize,
    pub column: usize,
}

impl Cursor {
    /// Top-left cell, where a fresh grid starts
    pub const ORIGIN: Cursor = Cursor { row: 0, column: 0 };

    pub fn is_origin(&self) -> bool {
        *self == Self::ORIGIN
    }
}

struct GridState {
    term: Term<GridEventProxy>,
    parser: ansi::Processor,
}

/// A fixed-size character grid
///
/// Cloning yields another handle to the same grid.
#[derive(Clone)]
pub struct Grid {
    state: Arc<FairMutex<GridState>>,
    responses: Arc<FairMutex<Receiver<Vec<u8>>>>,
    cols: u16,
    rows: u16,
}

impl Grid {
    /// Create an empty grid of `cols` x `rows`
    pub fn new(cols: u16, rows: u16) -> Self {
        let (sender, receiver) = mpsc::channel();
        let event_proxy = GridEventProxy { sender };

        let size = Size {
            cols: cols as usize,
            rows: rows as usize,
        };
        let term = Term::new(TermConfig::default(), &size, event_proxy);

        Self {
            state: Arc::new(FairMutex::new(GridState {
                term,
                parser: ansi::Processor::new(),
            })),
            responses: Arc::new(FairMutex::new(receiver)),
            cols,
            rows,
        }
    }

    /// Feed bytes through the VTE parser into the grid
    pub fn write(&self, data: &[u8]) {
        let mut state = self.state.lock();
        let GridState { term, parser } = &mut *state;
        for byte in data {
            parser.advance(term, *byte);
        }
    }

    /// Current cursor position
    pub fn cursor(&self) -> Cursor {
        let state = self.state.lock();
        let point = state.term.grid().cursor.point;
        Cursor {
            row: point.line.0.max(0) as usize,
            column: point.column.0,
        }
    }

    /// Full visible contents, one line per row joined by `\n`
    ///
    /// Rows keep their trailing blanks exactly as laid out. Spacer cells
    /// following wide characters are skipped.
    pub fn render(&self) -> String {
        let state = self.state.lock();
        let term = &state.term;
        let grid = term.grid();

        let mut lines = Vec::with_capacity(term.screen_lines());
        for line_idx in 0..term.screen_lines() {
            let row = &grid[Line(line_idx as i32)];
            let mut text = String::with_capacity(term.columns());
            for col in 0..term.columns() {
                let cell = &row[Column(col)];
                if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
                    continue;
                }
                text.push(if cell.c == '\0' { ' ' } else { cell.c });
            }
            lines.push(text);
        }

        lines.join("\n")
    }

    /// Terminal query responses (e.g. cursor position reports) generated
    /// since the last call
    pub fn take_responses(&self) -> Vec<Vec<u8>> {
        self.responses.lock().try_iter().collect()
    }

    /// Grid size as (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("cursor", &self.cursor())
            .finish()
    }
}
