//! Replication protocol end-to-end.
//!
//! Live marshal/replica/soldier applications over real host queues:
//! - a write sent to the marshal lands on the replica within a second
//! - a write sent to a soldier round-trips through the marshal and
//!   converges everywhere
//! - a marshal booting against a preloaded replica absorbs its state
//! - concurrent writes from two soldiers converge to the marshal's view
//!
//! Every scenario runs on a uniquely tagged topology; the harness unlinks
//! the queues on drop.

use std::time::Duration;

use rev_core::{Application, MarshalRole, ReplicaRole, SoldierRole};
use rev_test_utils::{Driver, SpawnedApp, TestTopology, test_config, wait_until};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

fn start_marshal(topo: &TestTopology) -> SpawnedApp {
    let app = Application::new(
        Box::new(MarshalRole::new(&topo.topology)),
        test_config(&topo.topology),
    )
    .unwrap();
    SpawnedApp::start(app)
}

fn start_replica(topo: &TestTopology) -> SpawnedApp {
    let app = Application::new(
        Box::new(ReplicaRole::new(&topo.topology)),
        test_config(&topo.topology),
    )
    .unwrap();
    SpawnedApp::start(app)
}

fn start_soldier(topo: &TestTopology, name: &str) -> SpawnedApp {
    let endpoint = topo
        .topology
        .soldier(&topo.soldier_name(name))
        .cloned()
        .expect("soldier in topology");
    let app = Application::new(
        Box::new(SoldierRole::new(endpoint, &topo.topology)),
        test_config(&topo.topology),
    )
    .unwrap();
    SpawnedApp::start(app)
}

/// Write to the marshal; the replica converges within a second.
#[test]
fn write_to_marshal_reaches_the_replica() {
    let mut topo = TestTopology::new(&[]);
    let marshal = start_marshal(&topo);
    let replica = start_replica(&topo);
    let driver = Driver::new(&topo.fresh_name("test_client"));

    let reply = driver
        .request(
            &topo.topology.marshal.name,
            "set",
            vec!["speed", "42"],
            REPLY_TIMEOUT,
        )
        .expect("marshal reply");
    // The marshal echoes the applied pairs to the writer.
    assert_eq!(reply.data, vec!["speed".to_owned(), "42".to_owned()]);

    assert!(wait_until(Duration::from_secs(1), || {
        marshal.app.state_map().get("speed").map(String::as_str) == Some("42")
    }));
    assert!(
        wait_until(Duration::from_secs(1), || {
            replica.app.state_map().get("speed").map(String::as_str) == Some("42")
        }),
        "replica did not converge within a second"
    );
}

/// Write to a soldier; it forwards to the marshal, converges on the echo,
/// and the replica follows.
#[test]
fn write_to_soldier_round_trips_through_the_marshal() {
    let mut topo = TestTopology::new(&["motor_controller"]);
    let marshal = start_marshal(&topo);
    let replica = start_replica(&topo);
    let motor = start_soldier(&topo, "motor_controller");
    let driver = Driver::new(&topo.fresh_name("test_client"));

    let reply = driver
        .request(
            &topo.soldier_name("motor_controller"),
            "set",
            vec!["torque", "7"],
            REPLY_TIMEOUT,
        )
        .expect("soldier reply");
    assert_eq!(reply.data, vec!["torque".to_owned(), "7".to_owned()]);

    assert!(wait_until(Duration::from_secs(1), || {
        marshal.app.state_map().get("torque").map(String::as_str) == Some("7")
    }));
    assert!(wait_until(Duration::from_secs(1), || {
        motor.app.state_map().get("torque").map(String::as_str) == Some("7")
    }));
    assert!(
        wait_until(Duration::from_secs(1), || {
            replica.app.state_map().get("torque").map(String::as_str) == Some("7")
        }),
        "replica did not converge within a second"
    );
}

/// A marshal booting against a preloaded replica pulls its state.
#[test]
fn marshal_boot_sync_absorbs_replica_state() {
    let topo = TestTopology::new(&[]);
    let snapshot_dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_dir.path().join("replica.json");
    serde_json::to_writer(
        std::fs::File::create(&snapshot).unwrap(),
        &std::collections::HashMap::from([("mode".to_owned(), "idle".to_owned())]),
    )
    .unwrap();

    let mut replica_config = test_config(&topo.topology);
    replica_config.state_file = Some(snapshot);
    let replica = SpawnedApp::start(
        Application::new(Box::new(ReplicaRole::new(&topo.topology)), replica_config).unwrap(),
    );
    assert!(wait_until(Duration::from_secs(1), || {
        replica.app.state_map().get("mode").map(String::as_str) == Some("idle")
    }));

    let marshal = start_marshal(&topo);
    assert!(
        wait_until(Duration::from_secs(2), || {
            marshal.app.state_map().get("mode").map(String::as_str) == Some("idle")
        }),
        "marshal did not absorb the replica's preloaded state"
    );
}

/// Concurrent writes from two soldiers: once writes cease, every endpoint
/// matches the marshal.
#[test]
fn all_endpoints_converge_to_the_marshals_view() {
    let mut topo = TestTopology::new(&["motor_controller", "telemeter"]);
    let marshal = start_marshal(&topo);
    let replica = start_replica(&topo);
    let motor = start_soldier(&topo, "motor_controller");
    let telemeter = start_soldier(&topo, "telemeter");
    let driver = Driver::new(&topo.fresh_name("test_client"));

    let motor_name = topo.soldier_name("motor_controller");
    let telemeter_name = topo.soldier_name("telemeter");
    driver
        .request(&motor_name, "set", vec!["a", "1"], REPLY_TIMEOUT)
        .expect("reply");
    driver
        .request(&telemeter_name, "set", vec!["b", "2"], REPLY_TIMEOUT)
        .expect("reply");
    // Conflicting writes to one key; the marshal's arrival order wins.
    driver
        .request(&motor_name, "set", vec!["c", "from_motor"], REPLY_TIMEOUT)
        .expect("reply");
    driver
        .request(&telemeter_name, "set", vec!["c", "from_telemeter"], REPLY_TIMEOUT)
        .expect("reply");

    let converged = wait_until(Duration::from_secs(2), || {
        let view = marshal.app.state_map();
        view.len() == 3
            && replica.app.state_map() == view
            && motor.app.state_map() == view
            && telemeter.app.state_map() == view
    });
    assert!(converged, "endpoints diverged after writes ceased");
    assert_eq!(
        marshal.app.state_map().get("c").map(String::as_str),
        Some("from_telemeter")
    );
}
