// rev-test-utils: Shared harness for the end-to-end suites.
//
// Queue names are global to the host, so every test run gets a uniquely
// tagged topology, and a guard unlinks the queues when the scenario ends
// (the resetter's job, done in-process).

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rev_core::{Application, RuntimeConfig};
use rev_mq::{MessageQueue, Messenger, MessengerConfig};
use rev_proto::{Endpoint, Message, Topology};

/// A uniquely named topology plus the guard that purges its queues.
pub struct TestTopology {
    pub topology: Topology,
    tag: String,
    extra_queues: Vec<String>,
}

impl TestTopology {
    /// A marshal, a replica, and `soldier_names.len()` soldiers, all tagged
    /// with one fresh UUID so concurrent test runs never collide.
    pub fn new(soldier_names: &[&str]) -> Self {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let topology = Topology {
            marshal: Endpoint::new(format!("marshal_{tag}")),
            replica: Endpoint::new(format!("replica_{tag}")),
            soldiers: soldier_names
                .iter()
                .map(|name| Endpoint::new(format!("{name}_{tag}")))
                .collect(),
        };
        Self {
            topology,
            tag,
            extra_queues: Vec::new(),
        }
    }

    /// The full endpoint name of the soldier created from `name`.
    pub fn soldier_name(&self, name: &str) -> String {
        format!("{name}_{}", self.tag)
    }

    /// A fresh endpoint name under this topology's tag, registered for
    /// cleanup (used for driver/client messengers).
    pub fn fresh_name(&mut self, name: &str) -> String {
        let full = format!("{name}_{}", self.tag);
        self.extra_queues.push(format!("/{full}"));
        full
    }
}

impl Drop for TestTopology {
    fn drop(&mut self) {
        for endpoint in self.topology.endpoints() {
            let _ = MessageQueue::unlink(&endpoint.queue_name());
        }
        for queue in &self.extra_queues {
            let _ = MessageQueue::unlink(queue);
        }
    }
}

/// A runtime configuration tuned for tests: short receive deadline, fast
/// replica dumps, a heart too slow to fire accidentally.
pub fn test_config(topology: &Topology) -> RuntimeConfig {
    RuntimeConfig {
        topology: topology.clone(),
        heart_period: Duration::from_secs(60),
        receive_deadline: Duration::from_millis(20),
        sync_period: Duration::from_millis(100),
        worker_count: 4,
        ..RuntimeConfig::default()
    }
}

/// An application running its `main()` on a dedicated thread.
pub struct SpawnedApp {
    pub app: Arc<Application>,
    main_thread: Option<JoinHandle<()>>,
}

impl SpawnedApp {
    pub fn start(app: Arc<Application>) -> Self {
        let main_thread = {
            let app = Arc::clone(&app);
            Some(thread::spawn(move || app.main()))
        };
        Self { app, main_thread }
    }

    /// Ask the loop to stop and join it.
    pub fn stop(&mut self) {
        self.app.request_exit();
        if let Some(main_thread) = self.main_thread.take() {
            let _ = main_thread.join();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.main_thread
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SpawnedApp {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A bare messenger for poking endpoints from the outside, with
/// request/response matching by identity.
pub struct Driver {
    messenger: Messenger,
}

impl Driver {
    pub fn new(name: &str) -> Self {
        Self {
            messenger: Messenger::new(name, MessengerConfig::default())
                .expect("open driver queue"),
        }
    }

    pub fn name(&self) -> &str {
        self.messenger.name()
    }

    /// Fire-and-forget send.
    pub fn fire(&self, recipient: &str, header: &str, data: Vec<&str>) -> Message {
        let message = Message::new(
            self.name(),
            recipient,
            header,
            data.into_iter().map(str::to_owned).collect(),
            0,
        );
        self.messenger.send(&message).expect("driver send");
        message
    }

    /// Send a request and wait up to `timeout` for its correlated response.
    pub fn request(
        &self,
        recipient: &str,
        header: &str,
        data: Vec<&str>,
        timeout: Duration,
    ) -> Option<Message> {
        let request = self.fire(recipient, header, data);
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(message)) = self.messenger.timed_receive_for(Duration::from_millis(50))
                && message.identity == request.identity
            {
                return Some(message);
            }
        }
        None
    }
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    predicate()
}
