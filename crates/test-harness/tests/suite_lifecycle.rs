//! Suite lifecycle against real sessions
//!
//! Every test skips when the environment cannot allocate a PTY.

use std::sync::Arc;
use std::time::{Duration, Instant};

use termscope::{Config, Session};
use test_harness::{HarnessError, Suite, SuiteOptions};

fn pty_available() -> bool {
    match Session::new() {
        Ok(_) => true,
        Err(e) => {
            eprintln!("Skipping: no PTY available ({e})");
            false
        }
    }
}

fn options() -> SuiteOptions {
    SuiteOptions {
        max_runtime: None,
        config: Config::default()
            .with_size(24, 80)
            .with_idle_timeout(Duration::from_secs(2)),
    }
}

#[test]
fn sessions_are_created_lazily_per_key() {
    test_harness::logging::init();
    if !pty_available() {
        return;
    }
    let suite = Suite::new("lazy", options()).unwrap();

    let first = suite.begin(suite.key("first")).unwrap();
    let second = suite.begin(suite.key("second")).unwrap();

    let a = first.session().unwrap();
    let again = first.session().unwrap();
    let b = second.session().unwrap();

    assert!(Arc::ptr_eq(&a, &again));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.lock().unwrap().config().columns, 80);
}

#[test]
fn teardown_closes_the_test_session() {
    if !pty_available() {
        return;
    }
    let suite = Suite::new("teardown", options()).unwrap();

    let test = suite.begin(suite.key("closes")).unwrap();
    let handle = test.session().unwrap();
    {
        let mut session = handle.lock().unwrap();
        session.write_str("before teardown").unwrap();
        session.expect_string(&["before teardown"]).unwrap();
    }
    drop(test);

    assert!(handle.lock().unwrap().is_closed());

    // A new run of the same key gets a fresh session
    let rerun = suite.begin(suite.key("closes")).unwrap();
    assert!(!Arc::ptr_eq(&handle, &rerun.session().unwrap()));
}

#[test]
fn shared_session_survives_tests() -> anyhow::Result<()> {
    if !pty_available() {
        return Ok(());
    }
    let suite = Suite::new("shared", options())?;
    let shared = suite.set_shared_session(Session::new()?);

    {
        let one = suite.begin(suite.key("one"))?;
        let two = suite.begin(suite.key("two"))?;
        assert!(Arc::ptr_eq(&one.session()?, &shared));
        assert!(Arc::ptr_eq(&two.session()?, &shared));
    }
    assert!(!shared.lock().unwrap().is_closed());

    suite.finish()?;
    assert!(shared.lock().unwrap().is_closed());
    Ok(())
}

#[test]
fn overrun_surfaces_as_timeout_and_fails_finish() {
    if !pty_available() {
        return;
    }
    let suite = Suite::new(
        "overrun",
        SuiteOptions {
            max_runtime: Some(Duration::from_millis(50)),
            config: Config::default().with_idle_timeout(Duration::from_secs(30)),
        },
    )
    .unwrap();

    {
        let test = suite.begin(suite.key("hangs")).unwrap();
        let handle = test.session().unwrap();
        let mut session = handle.lock().unwrap();

        let started = Instant::now();
        let err = session.expect_string(&["never printed"]).unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    let err = suite.finish().unwrap_err();
    assert!(matches!(err, HarnessError::Overrun { .. }), "got {err:?}");
}
