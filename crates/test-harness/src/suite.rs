//! Suite and test lifecycle
//!
//! A [`Suite`] hands out one lazily created [`Session`] per [`TestKey`],
//! unless a shared session has been installed, and closes it when the
//! test's [`TestCase`] guard goes out of scope. With
//! [`SuiteOptions::max_runtime`] set, a watchdog cancels every blocking
//! session operation in the suite once the limit passes; those operations
//! then fail as ordinary timeouts and [`Suite::finish`] reports the overrun.

use std::backtrace::Backtrace;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use termscope::{Cancellation, Config, Session};
use thiserror::Error;

/// A session shared between the suite and its tests
pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("session error: {0}")]
    Session(#[from] termscope::Error),

    #[error("suite {suite} exceeded its maximum runtime of {limit:?}")]
    Overrun { suite: String, limit: Duration },

    #[error("test {0} is already running")]
    AlreadyRunning(TestKey),

    #[error("failed to start watchdog: {0}")]
    Watchdog(std::io::Error),
}

/// Identity of one test within one suite
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestKey {
    pub suite: String,
    pub test: String,
}

impl TestKey {
    pub fn new(suite: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            test: test.into(),
        }
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.suite, self.test)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuiteOptions {
    /// Upper bound on the whole suite's runtime
    pub max_runtime: Option<Duration>,

    /// Settings for every session the suite creates
    pub config: Config,
}

#[derive(Default)]
struct SuiteState {
    sessions: HashMap<TestKey, SessionHandle>,
    shared: Option<SessionHandle>,
    running: HashSet<TestKey>,
}

pub struct Suite {
    name: String,
    options: SuiteOptions,
    cancellation: Cancellation,
    state: Mutex<SuiteState>,
    watchdog: Option<Watchdog>,
}

impl Suite {
    pub fn new(name: impl Into<String>, options: SuiteOptions) -> Result<Self, HarnessError> {
        let name = name.into();
        let cancellation = Cancellation::new();

        let watchdog = match options.max_runtime {
            Some(limit) => Some(
                Watchdog::spawn(name.clone(), limit, cancellation.clone()).map_err(HarnessError::Watchdog)?,
            ),
            None => None,
        };

        tracing::debug!(suite = %name, max_runtime = ?options.max_runtime, "suite started");

        Ok(Self {
            name,
            options,
            cancellation,
            state: Mutex::new(SuiteState::default()),
            watchdog,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key for `test` within this suite
    pub fn key(&self, test: impl Into<String>) -> TestKey {
        TestKey::new(self.name.clone(), test)
    }

    /// Token the watchdog cancels; every session the suite creates observes it
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Whether the watchdog has fired
    pub fn overran(&self) -> bool {
        self.watchdog.as_ref().is_some_and(Watchdog::fired)
    }

    fn lock(&self) -> MutexGuard<'_, SuiteState> {
        // State stays consistent even if a test panicked while holding it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `session` to every test instead of creating one per test
    ///
    /// Tests no longer close it at teardown; [`Suite::finish`] does.
    pub fn set_shared_session(&self, session: Session) -> SessionHandle {
        let handle = Arc::new(Mutex::new(session));
        if let Some(previous) = self.lock().shared.replace(Arc::clone(&handle)) {
            close(&previous, "replaced shared session");
        }
        handle
    }

    pub fn shared_session(&self) -> Option<SessionHandle> {
        self.lock().shared.clone()
    }

    /// Start the test identified by `key`
    pub fn begin(&self, key: TestKey) -> Result<TestCase<'_>, HarnessError> {
        if !self.lock().running.insert(key.clone()) {
            return Err(HarnessError::AlreadyRunning(key));
        }
        tracing::debug!(test = %key, "test started");
        Ok(TestCase { suite: self, key })
    }

    fn session_for(&self, key: &TestKey) -> Result<SessionHandle, HarnessError> {
        let mut state = self.lock();
        if let Some(shared) = &state.shared {
            return Ok(Arc::clone(shared));
        }
        if let Some(session) = state.sessions.get(key) {
            return Ok(Arc::clone(session));
        }

        let session = Session::builder()
            .config(self.options.config.clone())
            .cancellation(self.cancellation.clone())
            .build()?;
        let handle = Arc::new(Mutex::new(session));
        state.sessions.insert(key.clone(), Arc::clone(&handle));
        tracing::debug!(test = %key, "session created");
        Ok(handle)
    }

    fn teardown(&self, key: &TestKey) {
        let session = {
            let mut state = self.lock();
            state.running.remove(key);
            state.sessions.remove(key)
        };
        if let Some(session) = session {
            close(&session, "test teardown");
        }
        tracing::debug!(test = %key, "test finished");
    }

    /// Stop the watchdog and close the shared session
    ///
    /// Fails if the suite ran past its maximum runtime.
    pub fn finish(mut self) -> Result<(), HarnessError> {
        let overran = self.watchdog.take().is_some_and(|mut watchdog| watchdog.stop());

        let shared = self.lock().shared.take();
        if let Some(shared) = shared {
            close(&shared, "suite finished");
        }

        match (overran, self.options.max_runtime) {
            (true, Some(limit)) => Err(HarnessError::Overrun {
                suite: self.name.clone(),
                limit,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("max_runtime", &self.options.max_runtime)
            .field("overran", &self.overran())
            .finish()
    }
}

fn close(session: &SessionHandle, reason: &str) {
    let mut session = session.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(e) = session.close() {
        tracing::warn!(error = %e, reason, "failed to close session");
    }
}

/// A running test; tears the test down when dropped
pub struct TestCase<'a> {
    suite: &'a Suite,
    key: TestKey,
}

impl TestCase<'_> {
    pub fn key(&self) -> &TestKey {
        &self.key
    }

    /// This test's session, created on first use
    pub fn session(&self) -> Result<SessionHandle, HarnessError> {
        self.suite.session_for(&self.key)
    }
}

impl Drop for TestCase<'_> {
    fn drop(&mut self) {
        self.suite.teardown(&self.key);
    }
}

impl fmt::Debug for TestCase<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("key", &self.key).finish()
    }
}

/// Cancels the suite once its runtime limit passes
struct Watchdog {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    fn spawn(suite: String, limit: Duration, cancellation: Cancellation) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let handle = thread::Builder::new()
            .name("termscope-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(limit) {
                    let backtrace = Backtrace::force_capture();
                    tracing::error!(%suite, ?limit, %backtrace, "suite exceeded maximum runtime");
                    flag.store(true, Ordering::Release);
                    cancellation.cancel();
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
            fired,
        })
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Stop the thread and report whether it fired
    fn stop(&mut self) -> bool {
        // Dropping the sender wakes the thread
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.fired()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
