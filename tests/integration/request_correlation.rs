//! Request/response correlation end-to-end.
//!
//! Blocking `communicate` calls against a live endpoint: replies carry the
//! request's identity, concurrent callers are correlated independently, a
//! silent peer times out cleanly, and `exit` stops an endpoint within a
//! receive tick.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rev_core::{Application, StandaloneRole};
use rev_proto::Endpoint;
use rev_test_utils::{Driver, SpawnedApp, TestTopology, test_config, wait_until};

fn start_standalone(topo: &TestTopology, name: &str) -> SpawnedApp {
    let endpoint = Endpoint::new(topo.soldier_name(name));
    let app = Application::new(
        Box::new(StandaloneRole::new(endpoint)),
        test_config(&topo.topology),
    )
    .unwrap();
    SpawnedApp::start(app)
}

/// A handler's reply comes back with header `response`, the handler's data,
/// and the request's identity.
#[test]
fn replies_carry_the_request_identity() {
    let mut topo = TestTopology::new(&["server"]);
    let server = start_standalone(&topo, "server");
    server
        .app
        .set_handler("greet", Arc::new(|_, _| Some(vec!["hello".to_owned()])));
    let driver = Driver::new(&topo.fresh_name("caller"));

    let request = driver.fire(server.app.name(), "greet", vec![]);
    let reply = driver
        .request(server.app.name(), "greet", vec![], Duration::from_secs(5))
        .expect("correlated reply");
    assert_eq!(reply.header, "response");
    assert_eq!(reply.data, vec!["hello".to_owned()]);
    assert!(reply.identity > request.identity);
}

/// Two concurrent callers of a slow handler both return with the data,
/// after the handler delay, with distinct identities.
#[test]
fn concurrent_callers_are_correlated_independently() {
    let topo = TestTopology::new(&["server", "caller"]);
    let server = start_standalone(&topo, "server");
    server.app.set_handler(
        "slow",
        Arc::new(|_, _| {
            thread::sleep(Duration::from_secs(2));
            Some(vec!["ok".to_owned()])
        }),
    );
    let caller = start_standalone(&topo, "caller");

    let server_name = server.app.name().to_owned();
    let started = Instant::now();
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let caller = Arc::clone(&caller.app);
            let server_name = server_name.clone();
            thread::spawn(move || {
                caller
                    .communicate(&server_name, "slow", vec![], 0)
                    .expect("slow reply")
            })
        })
        .collect();
    let replies: Vec<_> = workers
        .into_iter()
        .map(|w| w.join().expect("caller thread"))
        .collect();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(2), "returned before the handler");
    assert!(
        elapsed < Duration::from_secs(4),
        "callers were serialized: {elapsed:?}"
    );
    assert_eq!(replies[0].data, vec!["ok".to_owned()]);
    assert_eq!(replies[1].data, vec!["ok".to_owned()]);
    assert_ne!(replies[0].identity, replies[1].identity);
}

/// A peer that never replies: the deadline variant returns `None` and
/// leaves the caller usable.
#[test]
fn communicate_timeout_survives_a_silent_peer() {
    let mut topo = TestTopology::new(&["caller"]);
    let caller = start_standalone(&topo, "caller");
    let silent = topo.fresh_name("silent");

    let reply = caller
        .app
        .communicate_timeout(&silent, "status", vec![], 0, Duration::from_millis(200))
        .unwrap();
    assert!(reply.is_none());

    // Correlation still works afterwards.
    let own = caller.app.name().to_owned();
    let reply = caller.app.communicate(&own, "status", vec![], 0).unwrap();
    assert_eq!(reply.header, "response");
}

/// `exit` stops the endpoint's main() within a receive tick.
#[test]
fn exit_header_stops_the_endpoint() {
    let mut topo = TestTopology::new(&["server"]);
    let server = start_standalone(&topo, "server");
    let driver = Driver::new(&topo.fresh_name("caller"));

    let reply = driver.request(server.app.name(), "exit", vec![], Duration::from_secs(5));
    assert!(reply.is_some(), "exit should still be acknowledged");
    assert!(
        wait_until(Duration::from_secs(1), || server.is_stopped()),
        "main() did not return after exit"
    );
}
