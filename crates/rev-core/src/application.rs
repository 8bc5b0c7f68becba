//! The per-endpoint application runtime.
//!
//! One `Application` per process, bound to one endpoint. The main loop
//! timed-reads the endpoint's own queue, hands each message to the worker
//! pool for handler dispatch, and beats the heart every iteration.
//! `response` frames bypass the pool and complete pending requests inline on
//! the receive thread.
//!
//! Lock ordering for any thread taking more than one lock:
//! responses > states > watchers > handlers > job queue. Handlers are always
//! invoked with no lock held.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rev_mq::{Messenger, MessengerConfig, MessengerError, QueueError};
use rev_proto::{HeaderSpace, KeySpace, Message, Topology};
use tracing::{debug, error, info, trace, warn};

use crate::config::RuntimeConfig;
use crate::heart::{AbortAction, Heart};
use crate::roles::Role;
use crate::worker_pool::WorkerPool;

/// A handler for one protocol header. Returning `Some(data)` sends a
/// `response` frame carrying `data` and the request's identity back to the
/// sender; `None` is fire-and-forget.
pub type Handler = Arc<dyn Fn(&Application, &Message) -> Option<Vec<String>> + Send + Sync>;

/// A watcher invoked after every successful write to its key.
pub type Watcher = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// One endpoint's runtime: receive loop, registries, state map, correlation
/// table, worker pool, and heart.
pub struct Application {
    config: RuntimeConfig,
    role: Box<dyn Role>,
    messenger: Arc<Messenger>,
    // Declared before the heart: on drop the pool joins while the heart is
    // still monitoring, so a wedged job ends in a heart abort, not a hang.
    worker_pool: WorkerPool,
    heart: Heart,
    status: AtomicBool,
    handlers: Mutex<HashMap<String, Handler>>,
    watchers: Mutex<HashMap<String, Watcher>>,
    states: Mutex<HashMap<String, String>>,
    responses: Mutex<HashMap<u64, Option<Message>>>,
    response_ready: Condvar,
}

impl Application {
    /// Build the runtime for `role`. Opens the endpoint's queue and starts
    /// the heart and worker pool; the receive loop starts in [`main`].
    ///
    /// [`main`]: Application::main
    pub fn new(role: Box<dyn Role>, config: RuntimeConfig) -> Result<Arc<Self>, QueueError> {
        Self::build(role, config, None)
    }

    /// Like [`Application::new`] with a custom heart missed-beat action.
    /// Production binaries use [`Application::new`]; this is the seam the
    /// liveness tests hook.
    pub fn with_heart_abort(
        role: Box<dyn Role>,
        config: RuntimeConfig,
        abort: AbortAction,
    ) -> Result<Arc<Self>, QueueError> {
        Self::build(role, config, Some(abort))
    }

    fn build(
        role: Box<dyn Role>,
        config: RuntimeConfig,
        abort: Option<AbortAction>,
    ) -> Result<Arc<Self>, QueueError> {
        let name = role.endpoint().name.clone();
        let messenger = Arc::new(Messenger::new(
            &name,
            MessengerConfig {
                queue_options: config.queue_options,
                receive_deadline: config.receive_deadline,
                send_priority: 0,
            },
        )?);

        let tick = {
            let messenger = Arc::clone(&messenger);
            let heartbeat = config.headers.heartbeat.clone();
            let own_name = name;
            Box::new(move || {
                let beat = Message::new(&own_name, &own_name, &heartbeat, vec![], 0);
                if let Err(error) = messenger.send(&beat) {
                    warn!(%error, "heartbeat self-send failed");
                }
            })
        };
        let heart = match abort {
            Some(abort) => Heart::with_abort_action(config.heart_period, tick, abort),
            None => Heart::new(config.heart_period, tick),
        };
        let worker_pool =
            WorkerPool::with_queue_depth(config.effective_worker_count(), config.job_queue_depth);

        Ok(Arc::new(Self {
            role,
            messenger,
            worker_pool,
            heart,
            status: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
            response_ready: Condvar::new(),
            config,
        }))
    }

    pub fn name(&self) -> &str {
        self.messenger.name()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn headers(&self) -> &HeaderSpace {
        &self.config.headers
    }

    pub fn keys(&self) -> &KeySpace {
        &self.config.keys
    }

    pub fn topology(&self) -> &Topology {
        &self.config.topology
    }

    pub fn role(&self) -> &dyn Role {
        self.role.as_ref()
    }

    pub fn status(&self) -> bool {
        self.status.load(Ordering::SeqCst)
    }

    /// Flip the receive loop off; it exits after the current iteration.
    pub fn request_exit(&self) {
        self.status.store(false, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Registries
    // -----------------------------------------------------------------------

    /// Register `handler` for `header`. At most one handler per header;
    /// overwriting an existing registration warns but succeeds.
    pub fn set_handler(&self, header: &str, handler: Handler) {
        let mut handlers = lock(&self.handlers);
        if handlers.insert(header.to_owned(), handler).is_some() {
            warn!(header = %header, "overriding an existing handler");
        } else {
            debug!(header = %header, "handler added");
        }
    }

    pub fn handler(&self, header: &str) -> Option<Handler> {
        lock(&self.handlers).get(header).cloned()
    }

    /// Register `watcher` for `key`. At most one watcher per key;
    /// overwriting warns but succeeds.
    pub fn set_watcher(&self, key: &str, watcher: Watcher) {
        let mut watchers = lock(&self.watchers);
        if watchers.insert(key.to_owned(), watcher).is_some() {
            warn!(key = %key, "overriding an existing watcher");
        } else {
            debug!(key = %key, "watcher added");
        }
    }

    fn watcher(&self, key: &str) -> Option<Watcher> {
        lock(&self.watchers).get(key).cloned()
    }

    /// Invoke the watcher for `key` (if any) without touching the state
    /// map. This is the notification-only path behind the `state`
    /// broadcast verb.
    pub fn notify_watcher(&self, key: &str, value: &str) {
        if let Some(watcher) = self.watcher(key) {
            watcher(key, value);
        }
    }

    // -----------------------------------------------------------------------
    // State map
    // -----------------------------------------------------------------------

    /// Read one key from the local state map.
    pub fn state(&self, key: &str) -> Option<String> {
        let states = lock(&self.states);
        let value = states.get(key).cloned();
        if value.is_none() {
            warn!(key = %key, "key not found");
        }
        value
    }

    /// The whole state map flattened to `[k0, v0, k1, v1, …]`.
    pub fn state_snapshot(&self) -> Vec<String> {
        let states = lock(&self.states);
        let mut data = Vec::with_capacity(states.len() * 2);
        for (key, value) in states.iter() {
            data.push(key.clone());
            data.push(value.clone());
        }
        data
    }

    /// A clone of the state map.
    pub fn state_map(&self) -> HashMap<String, String> {
        lock(&self.states).clone()
    }

    /// Store one key locally and notify its watcher. The watcher runs
    /// outside the state mutex; each successful write invokes it exactly
    /// once with the new value.
    pub fn store(&self, key: &str, value: &str) {
        {
            lock(&self.states).insert(key.to_owned(), value.to_owned());
        }
        if let Some(watcher) = self.watcher(key) {
            watcher(key, value);
        }
    }

    /// Apply `[k0, v0, k1, v1, …]` through the local write path. An odd
    /// trailing key is logged and dropped; the remaining pairs are applied.
    pub fn apply_write(&self, data: &[String]) {
        if data.len() % 2 == 1 {
            warn!(key = %data[data.len() - 1], "unpaired trailing key ignored");
        }
        for pair in data.chunks_exact(2) {
            self.store(&pair[0], &pair[1]);
        }
    }

    /// Drop every state entry (the `reset` verb's first half).
    pub fn clear_state(&self) {
        lock(&self.states).clear();
    }

    /// Write through the role's write path: marshals apply and fan out,
    /// soldiers round-trip through the marshal.
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), MessengerError> {
        self.role.write_state(self, key, value)
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Fire-and-forget send. Returns the sent message (with its stamped
    /// identity).
    pub fn send_to(
        &self,
        recipient: &str,
        header: &str,
        data: Vec<String>,
        priority: u32,
    ) -> Result<Message, MessengerError> {
        let message = Message::new(self.name(), recipient, header, data, priority);
        self.messenger.send(&message)?;
        Ok(message)
    }

    /// Blocking request/response round-trip. Sends `header` to `recipient`
    /// and parks the calling thread until the matching `response` arrives.
    /// There is no cancellation: a peer that never replies blocks forever —
    /// use [`Application::communicate_timeout`] when that is not acceptable.
    pub fn communicate(
        &self,
        recipient: &str,
        header: &str,
        data: Vec<String>,
        priority: u32,
    ) -> Result<Message, MessengerError> {
        let request = self.post_request(recipient, header, data, priority)?;
        let mut responses = lock(&self.responses);
        loop {
            if let Some(Some(reply)) = responses.get(&request.identity) {
                let reply = reply.clone();
                responses.remove(&request.identity);
                return Ok(reply);
            }
            responses = self
                .response_ready
                .wait(responses)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// [`Application::communicate`] with a deadline; `Ok(None)` on timeout.
    pub fn communicate_timeout(
        &self,
        recipient: &str,
        header: &str,
        data: Vec<String>,
        priority: u32,
        timeout: Duration,
    ) -> Result<Option<Message>, MessengerError> {
        let request = self.post_request(recipient, header, data, priority)?;
        let deadline = Instant::now() + timeout;
        let mut responses = lock(&self.responses);
        loop {
            if let Some(Some(reply)) = responses.get(&request.identity) {
                let reply = reply.clone();
                responses.remove(&request.identity);
                return Ok(Some(reply));
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
            else {
                responses.remove(&request.identity);
                return Ok(None);
            };
            responses = self
                .response_ready
                .wait_timeout(responses, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Insert the correlation slot, then send. Insertion first, so a reply
    /// racing back before the caller parks is never lost.
    fn post_request(
        &self,
        recipient: &str,
        header: &str,
        data: Vec<String>,
        priority: u32,
    ) -> Result<Message, MessengerError> {
        let request = Message::new(self.name(), recipient, header, data, priority);
        lock(&self.responses).insert(request.identity, None);
        if let Err(error) = self.messenger.send(&request) {
            lock(&self.responses).remove(&request.identity);
            return Err(error);
        }
        Ok(request)
    }

    /// Complete a pending request. Broadcast, not single-notify: several
    /// callers may be parked on distinct identities behind one condvar.
    fn complete_response(&self, message: Message) {
        let mut responses = lock(&self.responses);
        if let Some(slot) = responses.get_mut(&message.identity) {
            *slot = Some(message);
            self.response_ready.notify_all();
        } else {
            debug!(identity = message.identity, "unsolicited response dropped");
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start banner, setup, receive loop until `exit`, stop banner.
    pub fn main(self: &Arc<Self>) {
        info!(endpoint = %self.name(), "starting");
        self.setup();
        self.run();
        info!(endpoint = %self.name(), "stopping");
    }

    fn setup(self: &Arc<Self>) {
        self.status.store(true, Ordering::SeqCst);
        self.install_builtin_handlers();
        self.role.on_setup(self);
        if self.role.syncer().is_some() {
            // The boot sync runs on the pool so the receive loop is live
            // while the pull against the syncer blocks.
            let app = Arc::clone(self);
            self.worker_pool.work(move || app.sync_with_syncer());
        }
    }

    fn run(self: &Arc<Self>) {
        while self.status() {
            match self.messenger.timed_receive() {
                Ok(Some(message)) => {
                    trace!(%message, "received");
                    self.dispatch(message);
                }
                Ok(None) => {}
                Err(MessengerError::Frame(error)) => {
                    error!(%error, "dropping malformed frame");
                }
                Err(MessengerError::Queue(error)) => {
                    error!(%error, "receive failed");
                }
            }
            self.heart.beat();
        }
        self.heart.beat();
    }

    fn dispatch(self: &Arc<Self>, message: Message) {
        if message.header == self.headers().response {
            self.complete_response(message);
            return;
        }
        let app = Arc::clone(self);
        self.worker_pool.work(move || app.handle(&message));
    }

    /// Worker-side handling: look up the handler, invoke it with no lock
    /// held, and reply if it produced data.
    fn handle(&self, message: &Message) {
        let Some(handler) = self.handler(&message.header) else {
            warn!(%message, "no handler for header; dropping");
            return;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(self, message)));
        let reply_data = match outcome {
            Ok(data) => data,
            Err(_) => {
                error!(%message, "handler panicked");
                None
            }
        };
        if let Some(data) = reply_data {
            let response = message.reply(&self.headers().response, data);
            if let Err(error) = self.messenger.send(&response) {
                error!(%error, "failed to send response");
            }
        }
    }

    /// Pull the syncer's full state and run it through the role write path,
    /// as if the syncer had sent the `set` itself.
    pub fn sync_with_syncer(&self) {
        let Some(syncer) = self.role.syncer() else {
            debug!("no syncer configured; nothing to sync");
            return;
        };
        let syncer = syncer.name.clone();
        info!(syncer = %syncer, "syncing");
        let get = self.headers().get.clone();
        match self.communicate(&syncer, &get, vec![], 0) {
            Ok(response) => {
                let set = Message::with_identity(
                    &syncer,
                    self.name(),
                    self.headers().set.clone(),
                    response.data,
                    response.priority,
                    response.identity,
                );
                self.role.on_write(self, &set);
            }
            Err(error) => error!(%error, "sync failed"),
        }
    }

    fn install_builtin_handlers(&self) {
        let headers = self.headers().clone();

        self.set_handler(
            &headers.status,
            Arc::new(|_, message| {
                if !message.data.is_empty() {
                    warn!("status expects no arguments; ignoring them");
                }
                Some(vec![])
            }),
        );

        self.set_handler(
            &headers.get,
            Arc::new(|app, message| Some(app.handle_get(message))),
        );

        self.set_handler(
            &headers.set,
            Arc::new(|app, message| app.role().on_write(app, message)),
        );

        self.set_handler(
            &headers.reset,
            Arc::new(|app, message| {
                app.clear_state();
                app.apply_write(&message.data);
                app.role().on_applied(app);
                Some(vec![])
            }),
        );

        self.set_handler(
            &headers.sync,
            Arc::new(|app, _| {
                app.sync_with_syncer();
                Some(vec![])
            }),
        );

        // Normally short-circuited inline by dispatch; registered so the
        // header is never "unknown".
        self.set_handler(
            &headers.response,
            Arc::new(|app, message| {
                app.complete_response(message.clone());
                None
            }),
        );

        self.set_handler(&headers.heartbeat, Arc::new(|_, _| None));

        self.set_handler(
            &headers.exit,
            Arc::new(|app, message| {
                if !message.data.is_empty() {
                    warn!("exit expects no arguments; ignoring them");
                }
                info!("exiting gracefully");
                app.request_exit();
                Some(vec![])
            }),
        );

        self.set_handler(
            &headers.abort,
            Arc::new(|_, _| {
                error!("abort requested; terminating");
                std::process::abort();
            }),
        );

        self.set_handler(
            &headers.hang,
            Arc::new(|_, _| {
                warn!("hang requested; suspending this worker");
                loop {
                    std::thread::sleep(Duration::from_secs(3600));
                }
            }),
        );
    }

    /// Snapshot the requested keys (or every key when no arguments were
    /// given) as `[k0, v0, …]`. Missing keys are omitted with a warning.
    fn handle_get(&self, message: &Message) -> Vec<String> {
        let states = lock(&self.states);
        let mut data = Vec::new();
        if message.data.is_empty() {
            for (key, value) in states.iter() {
                data.push(key.clone());
                data.push(value.clone());
            }
        } else {
            for key in &message.data {
                if let Some(value) = states.get(key) {
                    data.push(key.clone());
                    data.push(value.clone());
                } else {
                    warn!(key = %key, "key not found; omitting");
                }
            }
        }
        data
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
