//! Heart liveness end-to-end.
//!
//! The abort action is injected so the watchdog firing can be observed
//! in-process instead of taking the test runner down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rev_core::{Application, RuntimeConfig, StandaloneRole};
use rev_proto::Endpoint;
use rev_test_utils::{Driver, TestTopology, test_config, wait_until};

fn abort_flag() -> (Arc<AtomicBool>, Box<dyn Fn() + Send + 'static>) {
    let flag = Arc::new(AtomicBool::new(false));
    let action = {
        let flag = Arc::clone(&flag);
        Box::new(move || flag.store(true, Ordering::SeqCst)) as Box<dyn Fn() + Send + 'static>
    };
    (flag, action)
}

/// A healthy loop beats the heart: no abort.
#[test]
fn beating_loop_is_not_aborted() {
    let topo = TestTopology::new(&["healthy"]);
    let config = RuntimeConfig {
        heart_period: Duration::from_millis(100),
        ..test_config(&topo.topology)
    };
    let (aborted, action) = abort_flag();
    let app = Application::with_heart_abort(
        Box::new(StandaloneRole::new(Endpoint::new(topo.soldier_name("healthy")))),
        config,
        action,
    )
    .unwrap();
    let runner = {
        let app = Arc::clone(&app);
        thread::spawn(move || app.main())
    };

    thread::sleep(Duration::from_millis(600));
    assert!(!aborted.load(Ordering::SeqCst), "healthy loop was aborted");

    app.request_exit();
    runner.join().unwrap();
}

/// A handler that never returns wedges the single worker; once the bounded
/// job FIFO fills, the main loop blocks in submission, stops beating, and
/// the heart fires within a couple of periods.
#[test]
fn wedged_pool_trips_the_heart() {
    let mut topo = TestTopology::new(&["wedged"]);
    let config = RuntimeConfig {
        heart_period: Duration::from_millis(100),
        worker_count: 1,
        job_queue_depth: 1,
        ..test_config(&topo.topology)
    };
    let (aborted, action) = abort_flag();
    let app = Application::with_heart_abort(
        Box::new(StandaloneRole::new(Endpoint::new(topo.soldier_name("wedged")))),
        config,
        action,
    )
    .unwrap();
    // The loop thread stays wedged past the end of the test (a real process
    // would have been aborted by now), so it is deliberately not joined.
    {
        let app = Arc::clone(&app);
        thread::spawn(move || app.main());
    }
    let driver = Driver::new(&topo.fresh_name("prodder"));
    let name = app.name().to_owned();

    driver.fire(&name, "hang", vec![]);
    // Fill the FIFO behind the hung worker until dispatch blocks.
    for _ in 0..4 {
        driver.fire(&name, "status", vec![]);
        thread::sleep(Duration::from_millis(20));
    }

    assert!(
        wait_until(Duration::from_secs(2), || aborted.load(Ordering::SeqCst)),
        "heart did not fire on a wedged pool"
    );
}
