// rev-mq: Host-local message-queue transport.
//
// A thin layer over POSIX message queues: `queue` owns the descriptor-level
// contract (open/send/receive/unlink), `messenger` couples it with the
// rev-proto frame format for endpoint-addressed delivery.

pub mod messenger;
pub mod queue;

pub use messenger::{Messenger, MessengerConfig, MessengerError};
pub use queue::{MessageQueue, QueueError, QueueOptions};
