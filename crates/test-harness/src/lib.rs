//! Suite lifecycle for termscope sessions
//!
//! Maps explicit test identities to sessions, tears them down after each
//! test, and bounds a whole batch of tests with a runtime watchdog.
//!
//! # Modules
//!
//! - `suite`: `Suite`, `TestCase` guards and the watchdog
//! - `logging`: tracing subscriber for test output

pub mod logging;
pub mod suite;

pub use suite::{HarnessError, SessionHandle, Suite, SuiteOptions, TestCase, TestKey};
