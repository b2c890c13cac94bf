//! PTY pump
//!
//! A background thread that drains the PTY master and fans every chunk out,
//! in read order, to the grid, the extra output sinks and the stream queue.
//! Terminal query responses produced by the grid are written straight back
//! into the PTY so programs that query the terminal get an answer.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use terminal::{Grid, Pty, PtyError, ReadStatus};

use crate::stream::StreamEvent;

/// Sleep between reads when the master has nothing for us
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// How long a write may make no progress before giving up
pub(crate) const WRITE_STALL_LIMIT: Duration = Duration::from_secs(1);

const READ_BUFFER_SIZE: usize = 4096;

pub(crate) type Sink = Box<dyn Write + Send>;

pub(crate) struct Pump {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Pump {
    pub(crate) fn spawn(
        pty: Arc<Pty>,
        grid: Grid,
        sinks: Vec<Sink>,
        events: Sender<StreamEvent>,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("termscope-pump".to_string())
            .spawn(move || run(&pty, &grid, sinks, &events, &flag))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it
    ///
    /// Returns false if the thread panicked. Calling it again is a no-op.
    pub(crate) fn stop(&mut self) -> bool {
        self.shutdown.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(pty: &Pty, grid: &Grid, mut sinks: Vec<Sink>, events: &Sender<StreamEvent>, shutdown: &AtomicBool) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while !shutdown.load(Ordering::Acquire) {
        match pty.read(&mut buf) {
            Ok(ReadStatus::Data(n)) => {
                let chunk = &buf[..n];
                grid.write(chunk);

                sinks.retain_mut(|sink| match sink.write_all(chunk).and_then(|()| sink.flush()) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "output sink failed, detaching it");
                        false
                    }
                });

                for response in grid.take_responses() {
                    if let Err(e) = write_all(pty, &response, WRITE_STALL_LIMIT) {
                        tracing::warn!(error = %e, "failed to answer terminal query");
                    }
                }

                if events.send(StreamEvent::Data(chunk.to_vec())).is_err() {
                    tracing::debug!("stream receiver gone, stopping pump");
                    return;
                }
            }
            Ok(ReadStatus::Empty) => thread::sleep(IDLE_SLEEP),
            Ok(ReadStatus::Closed) => {
                tracing::debug!("tty hung up");
                let _ = events.send(StreamEvent::Closed);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "PTY read failed");
                let _ = events.send(StreamEvent::Closed);
                return;
            }
        }
    }

    tracing::trace!("pump stopped");
}

fn io_error(e: PtyError) -> io::Error {
    match e {
        PtyError::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// Write all of `data` to the master, retrying while the PTY buffer is full
///
/// Fails with `TimedOut` when no progress is made for `stall_limit`.
pub(crate) fn write_all(pty: &Pty, mut data: &[u8], stall_limit: Duration) -> io::Result<()> {
    let mut stalled_since: Option<Instant> = None;

    while !data.is_empty() {
        let n = pty.write(data).map_err(io_error)?;
        if n > 0 {
            data = &data[n..];
            stalled_since = None;
            continue;
        }

        let since = *stalled_since.get_or_insert_with(Instant::now);
        if since.elapsed() >= stall_limit {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("PTY input stalled with {} bytes unwritten", data.len()),
            ));
        }
        thread::sleep(IDLE_SLEEP);
    }

    Ok(())
}

/// Copy `source` into the PTY on a detached thread until it ends or the
/// session closes
///
/// The thread may stay blocked in `read` after the session is gone; it
/// exits on the next chunk it fails to deliver.
pub(crate) fn spawn_input(name: &str, mut source: Box<dyn Read + Send>, pty: Weak<Pty>) -> io::Result<()> {
    let label = name.to_string();
    thread::Builder::new().name(format!("termscope-{name}")).spawn(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(input = %label, error = %e, "input source failed");
                    break;
                }
            };

            let Some(pty) = pty.upgrade() else {
                break;
            };
            if let Err(e) = write_all(&pty, &buf[..n], WRITE_STALL_LIMIT) {
                tracing::warn!(input = %label, error = %e, "failed to forward input");
                break;
            }
        }
        tracing::debug!(input = %label, "input copy finished");
    })?;

    Ok(())
}
