//! Terminal session
//!
//! A [`Session`] owns one PTY pair, the pump thread draining it, the grid the
//! pump renders into, and the stream queue expectations consume. The tty end
//! goes to the program under test; everything it prints (and everything
//! written as input, via echo) shows up both on the stream and on the grid.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;

use terminal::{Cursor, Grid, Pty};

use crate::cancel::Cancellation;
use crate::config::Config;
use crate::error::{Error, MismatchError};
use crate::idle;
use crate::matcher::{Matcher, Needle, Observation};
use crate::pump::{self, Pump, Sink};
use crate::stream::Stream;
use crate::view::Viewer;

/// Builder for [`Session`]
///
/// Serializable settings come from a [`Config`]; sinks, sources and the
/// cancellation token can only be set here.
pub struct SessionBuilder {
    config: Config,
    output: Option<Sink>,
    input: Option<Box<dyn Read + Send>>,
    cancellation: Cancellation,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            output: None,
            input: None,
            cancellation: Cancellation::new(),
        }
    }

    /// Replace all serializable settings
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn size(mut self, rows: u16, columns: u16) -> Self {
        self.config = self.config.with_size(rows, columns);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_idle_timeout(timeout);
        self
    }

    pub fn idle_duration(mut self, duration: Duration) -> Self {
        self.config = self.config.with_idle_duration(duration);
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_flush_timeout(timeout);
        self
    }

    /// Mirror everything read from the PTY into `sink`
    ///
    /// Only one extra sink is kept; a second call replaces the first.
    pub fn output(mut self, sink: impl Write + Send + 'static) -> Self {
        if self.output.is_some() {
            tracing::debug!("replacing previously configured output sink");
        }
        self.output = Some(Box::new(sink));
        self
    }

    /// Copy everything read from `source` into the program's input
    pub fn input(mut self, source: impl Read + Send + 'static) -> Self {
        self.input = Some(Box::new(source));
        self
    }

    /// Also wire this process's stdin and stdout into the session
    pub fn pipe_from_os(mut self, pipe: bool) -> Self {
        self.config.pipe_from_os = pipe;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Parent token for every blocking operation on the session
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn build(self) -> Result<Session, Error> {
        let SessionBuilder {
            config,
            output,
            input,
            cancellation,
        } = self;
        config.validate()?;

        let (pty, tty) = Pty::open(config.columns, config.rows)?;
        let pty = Arc::new(pty);
        let grid = Grid::new(config.columns, config.rows);

        let mut sinks: Vec<Sink> = Vec::new();
        sinks.extend(output);
        if config.pipe_from_os {
            sinks.push(Box::new(io::stdout()));
        }

        let (events_tx, events_rx) = mpsc::channel();
        let pump = Pump::spawn(Arc::clone(&pty), grid.clone(), sinks, events_tx)?;

        if let Some(source) = input {
            pump::spawn_input("input", source, Arc::downgrade(&pty))?;
        }
        if config.pipe_from_os {
            pump::spawn_input("stdin", Box::new(io::stdin()), Arc::downgrade(&pty))?;
        }

        tracing::info!(
            rows = config.rows,
            columns = config.columns,
            idle_timeout = ?config.idle_timeout(),
            flush_timeout = ?config.flush_timeout(),
            debug = config.debug,
            "session started"
        );

        Ok(Session {
            stream: Stream::new(events_rx, config.debug),
            config,
            grid,
            pty: Some(pty),
            tty: Some(tty),
            pump,
            cancellation,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An emulated terminal with a program-facing tty
pub struct Session {
    config: Config,
    grid: Grid,

    /// `None` once closed
    pty: Option<Arc<Pty>>,

    /// The program's end; `None` once hung up
    tty: Option<File>,

    stream: Stream,
    pump: Pump,
    cancellation: Cancellation,
}

impl Session {
    /// A session with default settings
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send `text` to the program's input
    pub fn write_str(&self, text: &str) -> Result<(), Error> {
        let pty = self.pty.as_ref().ok_or(Error::Closed)?;
        pump::write_all(pty, text.as_bytes(), pump::WRITE_STALL_LIMIT)?;
        Ok(())
    }

    /// A cloneable handle for writing input from other threads
    ///
    /// Writes through it fail with `BrokenPipe` once the session is closed.
    pub fn writer(&self) -> Writer {
        Writer {
            pty: self.pty.as_ref().map_or_else(Weak::new, Arc::downgrade),
        }
    }

    /// The program's end of the PTY
    ///
    /// Clone it with [`File::try_clone`] to hand it to a child process.
    pub fn tty(&self) -> Result<&File, Error> {
        self.tty.as_ref().ok_or(Error::Closed)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Snapshot access to the rendered view
    pub fn view(&self) -> Viewer<'_> {
        Viewer::new(&self.grid)
    }

    pub fn cursor(&self) -> Cursor {
        self.grid.cursor()
    }

    /// Token every blocking operation observes
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.pty.is_some() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    // ========== Stream operations ==========

    /// Consume stream bytes until one of `matchers` hits
    ///
    /// Returns everything consumed, raw. On failure nothing is consumed.
    pub fn expect(&mut self, matchers: &[Matcher], timeout: Duration) -> Result<String, Error> {
        self.ensure_open()?;
        self.stream.expect(matchers, timeout, &self.cancellation)
    }

    /// Expect any of `texts`, bounded by the idle timeout
    pub fn expect_string(&mut self, texts: &[&str]) -> Result<String, Error> {
        let matchers: Vec<Matcher> = texts.iter().map(|text| Matcher::literal(*text)).collect();
        self.expect(&matchers, self.config.idle_timeout())
    }

    /// Expect any of `patterns`, bounded by the idle timeout
    pub fn expect_pattern(&mut self, patterns: &[&str]) -> Result<String, Error> {
        let matchers = patterns
            .iter()
            .map(|pattern| Matcher::pattern(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        self.expect(&matchers, self.config.idle_timeout())
    }

    /// Expect the stream to end, bounded by the idle timeout
    pub fn expect_eof(&mut self) -> Result<String, Error> {
        self.expect(&[Matcher::Eof], self.config.idle_timeout())
    }

    /// Drain whatever is buffered without treating it as a match
    pub fn flush(&mut self) -> Result<String, Error> {
        self.ensure_open()?;
        let drained = self
            .stream
            .expect(&[Matcher::flush()], self.config.flush_timeout(), &self.cancellation)?;
        if self.config.debug {
            tracing::debug!(drained = drained.len(), pending = self.stream.pending_len(), "flushed");
        }
        Ok(drained)
    }

    /// Assert the program produces nothing further and exits
    ///
    /// Flushes, hangs up the session's own tty handle, then waits for the
    /// stream to end. Any other holder of the tty must close it too.
    pub fn no_more_expectations(&mut self) -> Result<(), Error> {
        self.flush()?;
        self.hang_up();
        self.expect_eof()?;
        Ok(())
    }

    /// Drop the session's handle on the tty
    pub fn hang_up(&mut self) {
        if self.tty.take().is_some() {
            tracing::debug!("session tty closed");
        }
    }

    // ========== View operations ==========

    /// Check every needle against one flushed, rendered snapshot
    ///
    /// Fails with a single [`MismatchError`] naming every needle that did
    /// not match, in the order given.
    pub fn contains(&mut self, needles: &[Needle]) -> Result<(), Error> {
        let matchers = needles
            .iter()
            .map(Needle::to_matcher)
            .collect::<Result<Vec<_>, _>>()?;
        if needles.is_empty() {
            return Ok(());
        }

        self.flush()?;
        let contents = self.view().strip_ansi(true).trim(true).render();
        let observation = Observation::Text(&contents);

        let failed: Vec<String> = needles
            .iter()
            .zip(&matchers)
            .filter(|(_, matcher)| !matcher.matches(&observation))
            .map(|(needle, _)| needle.as_str().to_string())
            .collect();

        if self.config.debug {
            tracing::debug!(needles = needles.len(), failed = failed.len(), %contents, "contains");
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(MismatchError { contents, failed }.into())
        }
    }

    pub fn contains_string(&mut self, texts: &[&str]) -> Result<(), Error> {
        let needles: Vec<Needle> = texts.iter().map(|text| Needle::text(*text)).collect();
        self.contains(&needles)
    }

    pub fn contains_pattern(&mut self, patterns: &[&str]) -> Result<(), Error> {
        let needles: Vec<Needle> = patterns.iter().map(|pattern| Needle::pattern(*pattern)).collect();
        self.contains(&needles)
    }

    /// Whether the flushed, trimmed view is exactly `expected`
    pub fn view_equals(&mut self, expected: &str) -> Result<bool, Error> {
        self.flush()?;
        Ok(self.view().strip_ansi(true).trim(true).render() == expected)
    }

    // ========== Idle detection ==========

    /// Block until the cursor has been still for the idle duration
    pub fn wait_for_idle(&self) -> Result<Cursor, Error> {
        self.wait_for_idle_until(&self.cancellation)
    }

    /// Like [`Session::wait_for_idle`], also giving up when `cancel` fires
    pub fn wait_for_idle_until(&self, cancel: &Cancellation) -> Result<Cursor, Error> {
        self.ensure_open()?;
        let cancel = self.cancellation.merge(cancel);
        idle::wait_for_idle(
            &self.grid,
            self.config.idle_duration(),
            self.config.idle_timeout(),
            &cancel,
        )
    }

    // ========== Lifecycle ==========

    /// Stop the pump and release the PTY
    ///
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(pty) = self.pty.take() else {
            return Ok(());
        };
        self.tty = None;
        let clean = self.pump.stop();
        drop(pty);

        tracing::debug!("session closed");
        if clean {
            Ok(())
        } else {
            Err(Error::Io(io::Error::other("pump thread panicked")))
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pty.is_none()
    }
}

/// Reads what was sent to the program, from the tty side
impl Read for Session {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.tty.as_mut() {
            Some(tty) => tty.read(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "session tty is closed")),
        }
    }
}

/// Sends input to the program
impl Write for Session {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer().write(buf)
    }

    /// No-op: writes reach the PTY before `write` returns
    ///
    /// This does not drain program output. That is the inherent
    /// [`Session::flush`], which takes precedence in method-call syntax;
    /// call this one as `Write::flush(&mut session)`.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "error closing session");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("rows", &self.config.rows)
            .field("columns", &self.config.columns)
            .field("closed", &self.is_closed())
            .field("pending", &self.stream.pending_len())
            .finish()
    }
}

/// Cloneable input handle for a [`Session`]
#[derive(Debug, Clone)]
pub struct Writer {
    pty: Weak<Pty>,
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pty = self
            .pty
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "session is closed"))?;
        pump::write_all(&pty, buf, pump::WRITE_STALL_LIMIT)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
